//! Async directory helpers

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use walkdir::WalkDir;

use crate::errors::UpdateError;
use crate::filesys::file::File;

/// Directory owned by the updater, or the install root when walking it
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        matches!(fs::metadata(&self.path).await, Ok(meta) if meta.is_dir())
    }

    pub async fn create(&self) -> Result<(), UpdateError> {
        Ok(fs::create_dir_all(&self.path).await?)
    }

    /// Recursive delete. Staging and backup directories only, never the install root.
    pub async fn delete(&self) -> Result<(), UpdateError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Immediate subdirectories, unordered
    pub async fn list_dirs(&self) -> Result<Vec<PathBuf>, UpdateError> {
        let mut dirs = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                dirs.push(entry.path());
            }
        }

        Ok(dirs)
    }

    /// Walk the tree and return every file as a `/`-separated path relative
    /// to this directory, skipping any entry whose relative path starts with
    /// one of `excluded`.
    pub fn walk_files(&self, excluded: &[String]) -> Result<BTreeSet<String>, UpdateError> {
        let mut files = BTreeSet::new();
        let walker = WalkDir::new(&self.path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let rel = relative_key(&self.path, entry.path());
                !is_excluded(&rel, excluded)
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                UpdateError::IoError(std::io::Error::other(format!(
                    "Failed to walk {}: {}",
                    self.path.display(),
                    e
                )))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = relative_key(&self.path, entry.path());
            if !rel.is_empty() {
                files.insert(rel);
            }
        }

        Ok(files)
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}

fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// True when `rel` equals an excluded prefix or lives under one
pub fn is_excluded(rel: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|prefix| {
        let prefix = prefix.trim_matches('/');
        !prefix.is_empty()
            && (rel == prefix
                || rel
                    .strip_prefix(prefix)
                    .map(|rest| rest.starts_with('/'))
                    .unwrap_or(false))
    })
}

//! Async file helpers

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::UpdateError;
use crate::utils::sha256_hex;

/// Path to a single file inside the install tree or the data dir
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True for anything at this path, dangling symlinks included
    pub async fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).await.is_ok()
    }

    pub async fn read_string(&self) -> Result<String, UpdateError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, UpdateError> {
        Ok(serde_json::from_str(&self.read_string().await?)?)
    }

    /// Replace the contents atomically
    pub async fn write_string(&self, contents: &str) -> Result<(), UpdateError> {
        self.write_atomic(contents.as_bytes()).await
    }

    /// Write in place, creating parent directories
    pub async fn write_bytes(&self, contents: &[u8]) -> Result<(), UpdateError> {
        self.ensure_parent().await?;
        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }

    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), UpdateError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Remove the file; a missing file is not an error
    pub async fn delete(&self) -> Result<(), UpdateError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Digest of the contents, or of the link target for a symlink
    pub async fn sha256(&self) -> Result<String, UpdateError> {
        if fs::symlink_metadata(&self.path).await?.file_type().is_symlink() {
            let target = fs::read_link(&self.path).await?;
            return Ok(sha256_hex(target.to_string_lossy().as_bytes()));
        }
        Ok(sha256_hex(&fs::read(&self.path).await?))
    }

    async fn ensure_parent(&self) -> Result<(), UpdateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Replace this file with a copy of `source`.
    ///
    /// Only this one path is removed; the parent directory is reused as-is
    /// and created only when missing. The source file's mode bits are
    /// carried over on Unix. A symlink is recreated with the same target,
    /// never followed.
    pub async fn replace_from(&self, source: &Path) -> Result<(), UpdateError> {
        let is_link = fs::symlink_metadata(source).await?.file_type().is_symlink();

        match fs::symlink_metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(UpdateError::ApplyFailed(format!(
                    "{} is a directory, refusing to replace it with a file",
                    self.path.display()
                )));
            }
            Ok(_) => fs::remove_file(&self.path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.ensure_parent().await?,
            Err(e) => return Err(e.into()),
        }

        if is_link {
            return self.link_like(source).await;
        }

        fs::copy(source, &self.path).await?;

        #[cfg(unix)]
        {
            let perms = fs::metadata(source).await?.permissions();
            fs::set_permissions(&self.path, perms).await?;
        }

        Ok(())
    }

    #[cfg(unix)]
    async fn link_like(&self, source: &Path) -> Result<(), UpdateError> {
        let target = fs::read_link(source).await?;
        fs::symlink(&target, &self.path).await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn link_like(&self, source: &Path) -> Result<(), UpdateError> {
        Err(UpdateError::ApplyFailed(format!(
            "{} is a symlink, unsupported on this platform",
            source.display()
        )))
    }

    /// Write a sibling temp file, then rename it over this path
    async fn write_atomic(&self, contents: &[u8]) -> Result<(), UpdateError> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                UpdateError::Internal(format!("{} has no file name", self.path.display()))
            })?;
        let temp = File::new(self.path.with_file_name(format!(".{}.tmp", name)));
        temp.write_bytes(contents).await?;
        fs::rename(temp.path(), &self.path).await?;
        Ok(())
    }
}

//! Canonical version marker
//!
//! A single one-line file in the install root holds the installed revision.
//! Nothing else in the updater is allowed to report a version.

use std::path::Path;

use crate::errors::UpdateError;
use crate::filesys::file::File;

#[derive(Debug, Clone)]
pub struct VersionMarker {
    file: File,
    name: String,
}

impl VersionMarker {
    pub fn new(install_root: &Path, name: &str) -> Self {
        Self {
            file: File::new(install_root.join(name)),
            name: name.to_string(),
        }
    }

    /// File name relative to the install root
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Installed revision, `None` when the marker is missing or blank
    pub async fn read(&self) -> Result<Option<String>, UpdateError> {
        if !self.file.exists().await {
            return Ok(None);
        }
        let contents = self.file.read_string().await?;
        let revision = contents.lines().next().unwrap_or("").trim().to_string();
        Ok((!revision.is_empty()).then_some(revision))
    }

    /// Installed revision or `NotFound`
    pub async fn require(&self) -> Result<String, UpdateError> {
        self.read().await?.ok_or_else(|| {
            UpdateError::NotFound(format!(
                "Version marker {} is missing or empty",
                self.file.path().display()
            ))
        })
    }

    /// Rewrite the marker in place
    pub async fn write(&self, revision: &str) -> Result<(), UpdateError> {
        self.file.write_string(&format!("{}\n", revision.trim())).await
    }
}

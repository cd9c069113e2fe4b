//! Disposable staging areas for candidate trees

use std::path::Path;

use tracing::{debug, warn};

use crate::errors::UpdateError;
use crate::filesys::dir::Dir;
use crate::storage::settings::is_within;

/// Hands out one empty directory per session, always outside the live tree
#[derive(Debug, Clone)]
pub struct Staging {
    parent: Dir,
}

impl Staging {
    pub fn new(parent: Dir, install_root: &Path) -> Result<Self, UpdateError> {
        if is_within(parent.path(), install_root) || is_within(install_root, parent.path()) {
            return Err(UpdateError::ConfigError(format!(
                "Staging dir {} overlaps install root {}",
                parent.path().display(),
                install_root.display()
            )));
        }
        Ok(Self { parent })
    }

    /// Fresh empty directory for `name`, replacing any leftover from a crashed run
    pub async fn prepare(&self, name: &str) -> Result<Dir, UpdateError> {
        let dir = self.parent.subdir(name);
        dir.delete().await?;
        dir.create().await?;
        debug!("Staging area ready at {}", dir.path().display());
        Ok(dir)
    }

    pub async fn discard(&self, dir: &Dir) {
        if !is_within(dir.path(), self.parent.path()) {
            warn!("Refusing to discard {} outside staging", dir.path().display());
            return;
        }
        if let Err(e) = dir.delete().await {
            warn!("Failed to remove staging {}: {}", dir.path().display(), e);
        }
    }

    /// Remove every leftover staging area
    pub async fn clear(&self) -> Result<(), UpdateError> {
        if !self.parent.exists().await {
            return Ok(());
        }
        for path in self.parent.list_dirs().await? {
            Dir::new(path).delete().await?;
        }
        Ok(())
    }
}

//! Cross-process instance lock
//!
//! The daemon and a local CLI invocation share the data directory. Whoever
//! holds the lock is the only process allowed to recover sessions, clear
//! staging areas and touch the install tree.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::errors::UpdateError;

/// Exclusive advisory lock, released on drop
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock without waiting; `UpdateInProgress` when another process holds it
    pub fn try_acquire(path: &Path) -> Result<Self, UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                return Err(UpdateError::UpdateInProgress(format!(
                    "another updater (pid {}) holds {}",
                    holder.trim(),
                    path.display()
                )));
            }
            return Err(UpdateError::IoError(e));
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;
        debug!("Acquired instance lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

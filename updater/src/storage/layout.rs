//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::UpdateError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/vox-updater/settings.json";

/// Environment variable overriding the settings file location
pub const SETTINGS_PATH_ENV: &str = "VOX_UPDATER_CONFIG";

/// Storage layout for the updater's own state.
///
/// Nothing here lives inside the install root; the live tree is only
/// reachable through the deployment descriptor.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all updater state
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Last update session, rewritten on every transition
    pub fn session_file(&self) -> File {
        File::new(self.base_dir.join("session.json"))
    }

    /// Backup snapshots, one subdirectory per record
    pub fn backups_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("backups"))
    }

    /// Parent of the disposable staging areas
    pub fn staging_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("staging"))
    }

    /// Held by the process that owns the install tree
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("updater.lock")
    }

    /// Bare git mirror of the remote repository
    pub fn mirror_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("mirror.git"))
    }

    /// Downloaded archives awaiting extraction
    pub fn downloads_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("downloads"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), UpdateError> {
        self.backups_dir().create().await?;
        self.staging_dir().create().await?;
        self.downloads_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/var/lib/vox-updater")
    }
}

/// Resolve the settings file from `--config`, the environment, or the default
pub fn settings_file(cli_path: Option<&str>) -> File {
    let path = cli_path
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(SETTINGS_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    File::new(path)
}

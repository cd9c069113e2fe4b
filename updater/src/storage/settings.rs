//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::UpdateError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Updater settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write a daily rolling log file under the data dir
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    /// Root of the live installation being managed
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Updater state directory (backups, staging, session)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Name of the canonical version marker inside the install root
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    /// Remote repository configuration
    #[serde(default)]
    pub repository: RepositorySettings,

    /// Hosted service configuration
    #[serde(default)]
    pub service: ServiceSettings,

    /// Pre-flight compatibility configuration
    #[serde(default)]
    pub compatibility: CompatibilitySettings,

    /// File replacement configuration
    #[serde(default)]
    pub apply: ApplySettings,

    /// Backup retention configuration
    #[serde(default)]
    pub backups: BackupSettings,

    /// Admin API server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Periodic remote check configuration
    #[serde(default)]
    pub auto_check: AutoCheckSettings,
}

fn default_true() -> bool {
    true
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/opt/vox")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/vox-updater")
}

fn default_marker_file() -> String {
    "VERSION".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: true,
            install_root: default_install_root(),
            data_dir: default_data_dir(),
            marker_file: default_marker_file(),
            repository: RepositorySettings::default(),
            service: ServiceSettings::default(),
            compatibility: CompatibilitySettings::default(),
            apply: ApplySettings::default(),
            backups: BackupSettings::default(),
            server: ServerSettings::default(),
            auto_check: AutoCheckSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file and validate them
    pub async fn load(file: &File) -> Result<Self, UpdateError> {
        if !file.exists().await {
            return Err(UpdateError::ConfigError(format!(
                "Settings file not found: {}",
                file.path().display()
            )));
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        info!("Loaded settings from {}", file.path().display());
        Ok(settings)
    }

    /// Reject settings that would put updater state inside the live tree
    pub fn validate(&self) -> Result<(), UpdateError> {
        if !self.install_root.is_absolute() {
            return Err(UpdateError::ConfigError(format!(
                "install_root must be absolute: {}",
                self.install_root.display()
            )));
        }
        if is_within(&self.data_dir, &self.install_root) {
            return Err(UpdateError::ConfigError(format!(
                "data_dir {} must be outside install_root {}",
                self.data_dir.display(),
                self.install_root.display()
            )));
        }
        if self.marker_file.is_empty() || self.marker_file.contains('/') {
            return Err(UpdateError::ConfigError(format!(
                "marker_file must be a plain file name: {:?}",
                self.marker_file
            )));
        }
        if self.backups.retain == 0 {
            return Err(UpdateError::ConfigError(
                "backups.retain must be at least 1".to_string(),
            ));
        }
        self.repository.validate()?;
        url::Url::parse(&self.service.health_url).map_err(|e| {
            UpdateError::ConfigError(format!(
                "Invalid service.health_url {}: {}",
                self.service.health_url, e
            ))
        })?;
        Ok(())
    }
}

/// True when `path` is `root` or lies below it
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Remote repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// Clone URL of the code repository
    #[serde(default = "default_repo_url")]
    pub url: String,

    /// Tracked branch
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Base URL of the hosting HTTP API used as secondary retrieval method
    #[serde(default)]
    pub api_base: Option<String>,

    /// `owner/name` slug for the HTTP API
    #[serde(default)]
    pub slug: Option<String>,

    /// Access token for private repositories
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    /// Timeout applied to every remote call
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,

    /// Timeout for materializing a full revision tree
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Maximum changelog entries reported by a check
    #[serde(default = "default_changelog_limit")]
    pub changelog_limit: usize,
}

fn default_repo_url() -> String {
    "https://github.com/vox-appliance/vox.git".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_network_timeout() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    600
}

fn default_changelog_limit() -> usize {
    50
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            url: default_repo_url(),
            branch: default_branch(),
            api_base: None,
            slug: None,
            token: None,
            network_timeout_secs: default_network_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            changelog_limit: default_changelog_limit(),
        }
    }
}

impl RepositorySettings {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<(), UpdateError> {
        if self.branch.trim().is_empty() {
            return Err(UpdateError::ConfigError(
                "repository.branch must not be empty".to_string(),
            ));
        }
        if let Some(api_base) = &self.api_base {
            url::Url::parse(api_base).map_err(|e| {
                UpdateError::ConfigError(format!("Invalid repository.api_base {}: {}", api_base, e))
            })?;
            match &self.slug {
                Some(slug) if slug.split('/').filter(|s| !s.is_empty()).count() == 2 => {}
                _ => {
                    return Err(UpdateError::ConfigError(
                        "repository.slug must be owner/name when api_base is set".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Hosted service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Supervisor unit name (without `.service`)
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Container name for docker-managed installs; hostname when absent
    #[serde(default)]
    pub container_name: Option<String>,

    /// Command used to start the service directly when no supervisor exists
    #[serde(default)]
    pub start_command: Option<String>,

    /// Local liveness probe of the hosted application
    #[serde(default = "default_health_url")]
    pub health_url: String,

    /// How long a restart may take to become healthy
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Delay between health probe attempts
    #[serde(default = "default_health_poll_interval")]
    pub health_poll_interval_ms: u64,

    /// Timeout for each stop/start command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_service_name() -> String {
    "vox".to_string()
}

fn default_health_url() -> String {
    "http://127.0.0.1:8000/health".to_string()
}

fn default_health_timeout() -> u64 {
    90
}

fn default_health_poll_interval() -> u64 {
    2000
}

fn default_command_timeout() -> u64 {
    60
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            container_name: None,
            start_command: None,
            health_url: default_health_url(),
            health_timeout_secs: default_health_timeout(),
            health_poll_interval_ms: default_health_poll_interval(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl ServiceSettings {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Compatibility pre-flight settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilitySettings {
    /// Requirements file inside the candidate tree
    #[serde(default = "default_requirements_file")]
    pub requirements_file: String,

    /// Command printing installed packages as `name==version` lines
    #[serde(default = "default_inventory_command")]
    pub inventory_command: Vec<String>,

    /// Internal modules (relative paths) the candidate must ship
    #[serde(default)]
    pub internal_modules: Vec<String>,
}

fn default_requirements_file() -> String {
    "requirements.txt".to_string()
}

fn default_inventory_command() -> Vec<String> {
    vec![
        "pip".to_string(),
        "list".to_string(),
        "--format=freeze".to_string(),
    ]
}

impl Default for CompatibilitySettings {
    fn default() -> Self {
        Self {
            requirements_file: default_requirements_file(),
            inventory_command: default_inventory_command(),
            internal_modules: Vec::new(),
        }
    }
}

/// File replacement settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplySettings {
    /// Relative paths never copied from a candidate into the live tree
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

fn default_excluded_paths() -> Vec<String> {
    vec![".git".to_string(), ".github".to_string()]
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            excluded_paths: default_excluded_paths(),
        }
    }
}

/// Backup retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Number of backups kept after a successful update
    #[serde(default = "default_retain")]
    pub retain: usize,

    /// Minimum free space that must remain after a backup
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

fn default_retain() -> usize {
    5
}

fn default_min_free_bytes() -> u64 {
    64 * 1024 * 1024
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retain: default_retain(),
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

/// Admin API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8765
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Periodic remote check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCheckSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_check_interval")]
    pub interval_secs: u64,
}

fn default_check_interval() -> u64 {
    6 * 3600
}

impl Default for AutoCheckSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_check_interval(),
        }
    }
}

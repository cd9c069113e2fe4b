//! Error types for the updater

use thiserror::Error;

/// Main error type for the updater
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Compatibility check failed: {0}")]
    CompatibilityFailed(String),

    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Apply failed: {0}")]
    ApplyFailed(String),

    #[error("Restart failed: {0}")]
    RestartFailed(String),

    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("Update already in progress: {0}")]
    UpdateInProgress(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UpdateError {
    /// Stable machine-readable code
    pub fn kind(&self) -> &'static str {
        match self {
            UpdateError::RemoteUnavailable(_) => "remote_unavailable",
            UpdateError::CompatibilityFailed(_) => "compatibility_failed",
            UpdateError::BackupFailed(_) => "backup_failed",
            UpdateError::ApplyFailed(_) => "apply_failed",
            UpdateError::RestartFailed(_) => "restart_failed",
            UpdateError::HealthCheckFailed(_) => "health_check_failed",
            UpdateError::RollbackFailed(_) => "rollback_failed",
            UpdateError::UpdateInProgress(_) => "update_in_progress",
            UpdateError::Cancelled(_) => "cancelled",
            UpdateError::NotFound(_) => "not_found",
            UpdateError::InvalidRevision(_) => "invalid_revision",
            UpdateError::ConfigError(_) => "config_error",
            UpdateError::IoError(_) => "io_error",
            UpdateError::JsonError(_) => "json_error",
            UpdateError::HttpError(_) => "http_error",
            UpdateError::ServerError(_) => "server_error",
            UpdateError::ShutdownError(_) => "shutdown_error",
            UpdateError::Internal(_) => "internal",
        }
    }

    /// True for failures that left the install tree untouched and can be retried as-is
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self,
            UpdateError::RemoteUnavailable(_)
                | UpdateError::CompatibilityFailed(_)
                | UpdateError::BackupFailed(_)
                | UpdateError::UpdateInProgress(_)
                | UpdateError::Cancelled(_)
        )
    }

    /// True for failures that must drive an automatic rollback
    pub fn triggers_rollback(&self) -> bool {
        matches!(
            self,
            UpdateError::ApplyFailed(_)
                | UpdateError::RestartFailed(_)
                | UpdateError::HealthCheckFailed(_)
        )
    }
}

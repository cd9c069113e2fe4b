//! Admin API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// One commit in a changelog or history listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitView {
    pub id: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Result of a remote check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfoView {
    pub local_revision: String,
    pub remote_revision: String,
    /// Absent when the installed revision is not on the tracked branch
    pub commits_behind: Option<usize>,
    pub update_available: bool,
    pub changelog: Vec<CommitView>,
    pub checked_at: DateTime<Utc>,
}

/// Machine-readable error attached to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionErrorView {
    pub kind: String,
    pub message: String,
}

/// Snapshot of the current or last update session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub kind: String,
    pub state: String,
    pub terminal: bool,
    pub progress_percent: u8,
    pub detail_message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source_revision: Option<String>,
    pub target_revision: Option<String>,
    pub backup_id: Option<String>,
    pub files_changed: usize,
    pub error: Option<SessionErrorView>,
}

/// Runtime environment classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentView {
    pub kind: String,
    pub install_root: String,
    pub service_handle: String,
    pub writable_permissions: bool,
}

/// `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub current_version: Option<String>,
    pub deployment: DeploymentView,
    pub session: Option<SessionView>,
    pub version_info: Option<VersionInfoView>,
}

/// `POST /apply`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyRequest {
    /// Revision to install; the remote branch tip when absent
    pub revision: Option<String>,
}

/// `POST /rollback`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    /// Backup to restore; the most recent one when absent
    pub record_id: Option<String>,
}

/// Returned by `POST /apply` and `POST /rollback`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedResponse {
    pub session_id: Uuid,
    pub state: String,
}

/// `POST /cancel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub message: String,
}

/// One backup snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source_revision: String,
    pub files: usize,
    pub retention_rank: usize,
}

/// `GET /backups`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupListResponse {
    pub backups: Vec<BackupView>,
    pub total: usize,
}

/// `GET /history`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub commits: Vec<CommitView>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

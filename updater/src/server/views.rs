//! Conversions from updater types to admin API models

use admin_api::{
    BackupView, CommitView, DeploymentView, SessionErrorView, SessionStartedResponse,
    SessionView, StatusResponse, VersionInfoView,
};

use crate::backup::BackupRecord;
use crate::deploy::session::{SessionKind, UpdateSession};
use crate::deploy::{SessionStarted, StatusSnapshot};
use crate::detect::DeploymentDescriptor;
use crate::remote::source::VersionInfo;
use crate::remote::CommitSummary;

pub fn commit_view(commit: &CommitSummary) -> CommitView {
    CommitView {
        id: commit.id.clone(),
        message: commit.message.clone(),
        timestamp: commit.timestamp,
    }
}

pub fn version_info_view(info: &VersionInfo) -> VersionInfoView {
    VersionInfoView {
        local_revision: info.local_revision.clone(),
        remote_revision: info.remote_revision.clone(),
        commits_behind: info.commits_behind,
        update_available: info.update_available(),
        changelog: info.changelog.iter().map(commit_view).collect(),
        checked_at: info.checked_at,
    }
}

pub fn session_view(session: &UpdateSession) -> SessionView {
    SessionView {
        id: session.id,
        kind: match session.kind {
            SessionKind::Update => "update",
            SessionKind::Rollback => "rollback",
        }
        .to_string(),
        state: session.state.as_str().to_string(),
        terminal: session.is_terminal(),
        progress_percent: session.progress_percent,
        detail_message: session.detail_message.clone(),
        started_at: session.started_at,
        finished_at: session.finished_at,
        source_revision: session.source_revision.clone(),
        target_revision: session.target_revision.clone(),
        backup_id: session.backup_id.clone(),
        files_changed: session.files_changed.len(),
        error: session.error.as_ref().map(|e| SessionErrorView {
            kind: e.kind.clone(),
            message: e.message.clone(),
        }),
    }
}

pub fn deployment_view(descriptor: &DeploymentDescriptor) -> DeploymentView {
    DeploymentView {
        kind: descriptor.kind.as_str().to_string(),
        install_root: descriptor.install_root.display().to_string(),
        service_handle: descriptor.service_handle.to_string(),
        writable_permissions: descriptor.writable_permissions,
    }
}

pub fn status_response(status: &StatusSnapshot) -> StatusResponse {
    StatusResponse {
        current_version: status.current_version.clone(),
        deployment: deployment_view(&status.descriptor),
        session: status.session.as_ref().map(session_view),
        version_info: status.last_check.as_ref().map(version_info_view),
    }
}

pub fn backup_view(record: &BackupRecord) -> BackupView {
    BackupView {
        id: record.id.clone(),
        created_at: record.created_at,
        source_revision: record.source_revision.clone(),
        files: record.files_saved(),
        retention_rank: record.retention_rank,
    }
}

pub fn session_started_response(started: &SessionStarted) -> SessionStartedResponse {
    SessionStartedResponse {
        session_id: started.session_id,
        state: started.state.as_str().to_string(),
    }
}

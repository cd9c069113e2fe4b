//! Update session record and its on-disk copy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::deploy::fsm::UpdateState;
use crate::errors::UpdateError;
use crate::filesys::file::File;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Update,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    /// Machine code from [`UpdateError::kind`]
    pub kind: String,
    pub message: String,
}

impl From<&UpdateError> for SessionError {
    fn from(e: &UpdateError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// One update or rollback attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSession {
    pub id: Uuid,
    pub kind: SessionKind,
    pub state: UpdateState,
    pub progress_percent: u8,
    pub detail_message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source_revision: Option<String>,
    pub target_revision: Option<String>,
    pub backup_id: Option<String>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    pub error: Option<SessionError>,
}

impl UpdateSession {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: UpdateState::Idle,
            progress_percent: 0,
            detail_message: "starting".to_string(),
            started_at: Utc::now(),
            finished_at: None,
            source_revision: None,
            target_revision: None,
            backup_id: None,
            files_changed: Vec::new(),
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `state`, stamping progress and the finish time
    pub fn transition(&mut self, state: UpdateState, detail: impl Into<String>) {
        self.state = state;
        self.progress_percent = state.progress_percent();
        self.detail_message = detail.into();
        if state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Mark a session left behind by a crashed or killed updater
    pub fn mark_interrupted(&mut self) {
        let previous = self.state;
        self.error = Some(SessionError {
            kind: "internal".to_string(),
            message: format!("Updater stopped while session was {}", previous.as_str()),
        });
        self.transition(
            UpdateState::Failed,
            format!("interrupted during {}", previous.as_str()),
        );
    }
}

/// Persists the last session as JSON
#[derive(Debug, Clone)]
pub struct SessionStore {
    file: File,
}

impl SessionStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub async fn save(&self, session: &UpdateSession) -> Result<(), UpdateError> {
        self.file.write_json(session).await
    }

    /// Last persisted session; unreadable files are ignored
    pub async fn load(&self) -> Option<UpdateSession> {
        if !self.file.exists().await {
            return None;
        }
        match self.file.read_json().await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(
                    "Ignoring unreadable session file {}: {}",
                    self.file.path().display(),
                    e
                );
                None
            }
        }
    }

    /// Load the last session, converting a non-terminal one to `Failed`
    pub async fn recover(&self) -> Result<Option<UpdateSession>, UpdateError> {
        let Some(mut session) = self.load().await else {
            return Ok(None);
        };
        if !session.is_terminal() {
            warn!(
                "Session {} was interrupted in state {}",
                session.id,
                session.state.as_str()
            );
            session.mark_interrupted();
            self.save(&session).await?;
        } else {
            debug!("Last session {} ended {}", session.id, session.state.as_str());
        }
        Ok(Some(session))
    }
}

//! Finite state machine for update sessions

use serde::{Deserialize, Serialize};

/// Update session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// No session running
    Idle,

    /// Staging the candidate and running the compatibility gate
    Checking,

    /// Candidate rejected before anything was touched
    CompatibilityFailed,

    /// Snapshotting the files about to change
    BackingUp,

    /// Stopping the service and replacing files
    Applying,

    /// Starting the service on the new tree
    Restarting,

    /// Waiting for the health probe
    Verifying,

    /// Restoring the last backup
    RollingBack,

    /// Update installed and healthy
    Completed,

    /// Ended without a usable result
    Failed,

    /// Previous tree restored and the service restarted
    RolledBack,
}

impl UpdateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::CompatibilityFailed => "compatibility_failed",
            UpdateState::BackingUp => "backing_up",
            UpdateState::Applying => "applying",
            UpdateState::Restarting => "restarting",
            UpdateState::Verifying => "verifying",
            UpdateState::RollingBack => "rolling_back",
            UpdateState::Completed => "completed",
            UpdateState::Failed => "failed",
            UpdateState::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UpdateState::CompatibilityFailed
                | UpdateState::Completed
                | UpdateState::Failed
                | UpdateState::RolledBack
        )
    }

    /// True once the live tree may have been modified
    pub fn live_tree_touched(&self) -> bool {
        matches!(
            self,
            UpdateState::Applying
                | UpdateState::Restarting
                | UpdateState::Verifying
                | UpdateState::RollingBack
        )
    }

    /// Cancellation is honoured only before the live tree is touched
    pub fn is_cancellable(&self) -> bool {
        matches!(self, UpdateState::Checking | UpdateState::BackingUp)
    }

    /// Coarse progress figure reported with the session
    pub fn progress_percent(&self) -> u8 {
        match self {
            UpdateState::Idle => 0,
            UpdateState::Checking => 10,
            UpdateState::BackingUp => 30,
            UpdateState::Applying => 50,
            UpdateState::Restarting => 70,
            UpdateState::Verifying => 85,
            UpdateState::RollingBack => 60,
            UpdateState::CompatibilityFailed
            | UpdateState::Completed
            | UpdateState::Failed
            | UpdateState::RolledBack => 100,
        }
    }
}

/// Update event
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Start an update session
    BeginUpdate,

    /// Start a manual rollback session
    BeginRollback,

    /// Candidate already installed
    AlreadyCurrent,

    /// Compatibility gate passed
    CompatibilityOk,

    /// Compatibility gate rejected the candidate
    CompatibilityRejected(String),

    /// Backup written
    BackupOk,

    /// Files replaced
    ApplyOk,

    /// Service start command succeeded
    StartOk,

    /// Health probe reported healthy
    HealthOk,

    /// Failure before the live tree was modified (includes cancellation)
    Abort(String),

    /// Failure after the live tree was modified
    Fault(String),

    /// Backup restored and service started
    RollbackOk,

    /// Restore or post-restore restart failed
    RollbackFailed(String),
}

/// Update FSM
#[derive(Debug, Clone)]
pub struct UpdateFsm {
    state: UpdateState,
    error: Option<String>,
}

impl UpdateFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: UpdateState::Idle,
            error: None,
        }
    }

    /// Pick up a persisted session at `state`
    pub fn resume(state: UpdateState) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: UpdateEvent) -> Result<UpdateState, String> {
        use UpdateEvent as E;
        use UpdateState as S;

        let new_state = match (self.state, &event) {
            // From Idle
            (S::Idle, E::BeginUpdate) => {
                self.error = None;
                S::Checking
            }
            (S::Idle, E::BeginRollback) => {
                self.error = None;
                S::RollingBack
            }

            // From Checking
            (S::Checking, E::AlreadyCurrent) => S::Completed,
            (S::Checking, E::CompatibilityOk) => S::BackingUp,
            (S::Checking, E::CompatibilityRejected(err)) => {
                self.error = Some(err.clone());
                S::CompatibilityFailed
            }

            // From BackingUp
            (S::BackingUp, E::BackupOk) => S::Applying,

            // From Applying
            (S::Applying, E::ApplyOk) => S::Restarting,

            // From Restarting
            (S::Restarting, E::StartOk) => S::Verifying,

            // From Verifying
            (S::Verifying, E::HealthOk) => S::Completed,

            // Nothing written yet
            (S::Checking | S::BackingUp | S::Applying, E::Abort(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            // Live tree modified
            (S::Applying | S::Restarting | S::Verifying, E::Fault(err)) => {
                self.error = Some(err.clone());
                S::RollingBack
            }

            // From RollingBack
            (S::RollingBack, E::RollbackOk) => S::RolledBack,
            (S::RollingBack, E::RollbackFailed(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for UpdateFsm {
    fn default() -> Self {
        Self::new()
    }
}

//! Update orchestration
//!
//! Drives one update or rollback session at a time through [`UpdateFsm`].
//! `apply` and `rollback` return as soon as the session is registered; the
//! work runs on a spawned task that owns the session guard until the session
//! reaches a terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backup::{BackupArchive, BackupRecord};
use crate::compat::CompatibilityChecker;
use crate::deploy::applier::UpdateApplier;
use crate::deploy::fsm::{UpdateEvent, UpdateFsm, UpdateState};
use crate::deploy::session::{SessionKind, SessionStore, UpdateSession};
use crate::deploy::staging::Staging;
use crate::detect::{DeploymentDescriptor, DeploymentKind};
use crate::errors::UpdateError;
use crate::filesys::dir::Dir;
use crate::remote::source::{VersionInfo, VersionSource};
use crate::remote::{validate_revision, CommitSummary};
use crate::service::ServiceControl;
use crate::utils::short_revision;

/// Collaborators the orchestrator is assembled from
pub struct OrchestratorParts {
    pub descriptor: DeploymentDescriptor,
    pub source: VersionSource,
    pub compat: CompatibilityChecker,
    pub backups: BackupArchive,
    pub applier: UpdateApplier,
    pub service: Arc<dyn ServiceControl>,
    pub staging: Staging,
    pub store: SessionStore,
    pub health_timeout: Duration,
    pub retain: usize,
}

/// Returned by `apply`/`rollback` once the session is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub state: UpdateState,
}

/// Non-blocking snapshot of everything the orchestrator knows
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub descriptor: DeploymentDescriptor,
    pub current_version: Option<String>,
    pub session: Option<UpdateSession>,
    pub last_check: Option<VersionInfo>,
}

enum Failure {
    /// Nothing in the live tree was touched
    Abort(UpdateError),
    /// The live tree may differ from the backup
    Fault { error: UpdateError, backup_id: String },
}

#[derive(Clone)]
pub struct UpdateOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    parts: OrchestratorParts,
    guard: Arc<Mutex<()>>,
    session: RwLock<Option<UpdateSession>>,
    last_check: RwLock<Option<VersionInfo>>,
    cancel: AtomicBool,
}

impl UpdateOrchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                guard: Arc::new(Mutex::new(())),
                session: RwLock::new(None),
                last_check: RwLock::new(None),
                cancel: AtomicBool::new(false),
            }),
        }
    }

    /// Reload the last persisted session and settle it if it never finished.
    ///
    /// A session interrupted after the live tree was touched is carried to a
    /// terminal state: a restart that was under way is verified, anything
    /// else restores the recorded backup. Earlier interruptions are marked
    /// `Failed`. Call only while holding the instance lock.
    pub async fn recover(&self) -> Result<Option<UpdateSession>, UpdateError> {
        let parts = &self.inner.parts;
        let pending = parts.store.load().await.and_then(|session| {
            let backup_id = session.backup_id.clone()?;
            (!session.is_terminal() && session.state.live_tree_touched())
                .then_some((session, backup_id))
        });

        let recovered = match pending {
            Some((session, backup_id)) => Some(self.resume(session, &backup_id).await?),
            None => {
                let recovered = parts.store.recover().await?;
                *self.inner.write_session() = recovered.clone();
                recovered
            }
        };

        if let Err(e) = parts.staging.clear().await {
            warn!("Failed to clear leftover staging areas: {}", e);
        }
        Ok(recovered)
    }

    async fn resume(
        &self,
        session: UpdateSession,
        backup_id: &str,
    ) -> Result<UpdateSession, UpdateError> {
        let _guard = self.inner.try_acquire()?;
        warn!(
            "Session {} was interrupted in state {} (backup {})",
            session.id,
            session.state.as_str(),
            backup_id
        );
        let mut fsm = UpdateFsm::resume(session.state);
        *self.inner.write_session() = Some(session.clone());
        self.inner.resume_interrupted(&mut fsm, backup_id).await;
        Ok(self.session().unwrap_or(session))
    }

    /// True while a session is registered and not yet terminal
    pub fn is_busy(&self) -> bool {
        self.inner
            .read_session()
            .as_ref()
            .is_some_and(|s| !s.is_terminal())
    }

    /// Show the persisted session as-is, without recovering it
    pub async fn load_session(&self) -> Option<UpdateSession> {
        let loaded = self.inner.parts.store.load().await;
        *self.inner.write_session() = loaded.clone();
        loaded
    }

    pub fn descriptor(&self) -> &DeploymentDescriptor {
        &self.inner.parts.descriptor
    }

    /// Installed revision from the version marker
    pub async fn current_version(&self) -> Result<String, UpdateError> {
        self.inner.parts.source.current_version().await
    }

    /// Query the remote; never starts a session
    pub async fn check(&self) -> Result<VersionInfo, UpdateError> {
        let info = self.inner.parts.source.check_remote().await?;
        *self
            .inner
            .last_check
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(info.clone());
        Ok(info)
    }

    /// Start updating to `target`, or to the remote tip when `None`
    pub async fn apply(&self, target: Option<String>) -> Result<SessionStarted, UpdateError> {
        if let Some(revision) = &target {
            validate_revision(revision)?;
        }
        let guard = self.inner.try_acquire()?;
        let mut fsm = UpdateFsm::new();
        let session = self
            .inner
            .begin(&mut fsm, SessionKind::Update, UpdateEvent::BeginUpdate, |s| {
                s.target_revision = target.clone();
            })
            .await;
        info!("Update session {} started", session.id);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_update(fsm, target).await;
            drop(guard);
        });

        Ok(SessionStarted {
            session_id: session.id,
            state: session.state,
        })
    }

    /// Restore `record_id`, or the most recent backup when `None`
    pub async fn rollback(&self, record_id: Option<String>) -> Result<SessionStarted, UpdateError> {
        let guard = self.inner.try_acquire()?;
        let record = match record_id {
            Some(id) => self.inner.parts.backups.get(&id).await?,
            None => self
                .inner
                .parts
                .backups
                .latest()
                .await?
                .ok_or_else(|| UpdateError::NotFound("No backups available".to_string()))?,
        };
        let source = self.current_version().await.ok();

        let mut fsm = UpdateFsm::new();
        let session = self
            .inner
            .begin(&mut fsm, SessionKind::Rollback, UpdateEvent::BeginRollback, |s| {
                s.source_revision = source.clone();
                s.target_revision = Some(record.source_revision.clone());
                s.backup_id = Some(record.id.clone());
            })
            .await;
        info!("Rollback session {} started (backup {})", session.id, record.id);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.restore_and_restart(&mut fsm, &record.id, true).await;
            drop(guard);
        });

        Ok(SessionStarted {
            session_id: session.id,
            state: session.state,
        })
    }

    /// Request cancellation; `false` once the live tree may be touched
    pub fn cancel(&self) -> bool {
        let session = self.inner.write_session();
        match session.as_ref() {
            Some(s) if !s.is_terminal() && s.state.is_cancellable() => {
                self.inner.cancel.store(true, Ordering::SeqCst);
                info!("Cancellation requested for session {}", s.id);
                true
            }
            _ => false,
        }
    }

    pub fn session(&self) -> Option<UpdateSession> {
        self.inner.read_session().clone()
    }

    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            descriptor: self.inner.parts.descriptor.clone(),
            current_version: self.current_version().await.ok(),
            session: self.session(),
            last_check: self
                .inner
                .last_check
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    pub async fn backups(&self) -> Result<Vec<BackupRecord>, UpdateError> {
        self.inner.parts.backups.list().await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError> {
        self.inner.parts.source.fetch_history(limit).await
    }

    /// Wait until the current session is terminal and its task has released the guard
    pub async fn wait_for_terminal(&self, timeout: Duration) -> Result<UpdateSession, UpdateError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(session) = self.session() {
                if session.is_terminal() && self.inner.guard.try_lock().is_ok() {
                    return Ok(session);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(UpdateError::Internal(format!(
                    "Session not finished after {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Inner {
    fn read_session(&self) -> RwLockReadGuard<'_, Option<UpdateSession>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<UpdateSession>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    fn try_acquire(&self) -> Result<OwnedMutexGuard<()>, UpdateError> {
        self.guard.clone().try_lock_owned().map_err(|_| {
            let running = self
                .read_session()
                .as_ref()
                .map(|s| format!("session {} is {}", s.id, s.state.as_str()))
                .unwrap_or_else(|| "another session is running".to_string());
            UpdateError::UpdateInProgress(running)
        })
    }

    async fn begin(
        &self,
        fsm: &mut UpdateFsm,
        kind: SessionKind,
        event: UpdateEvent,
        init: impl FnOnce(&mut UpdateSession),
    ) -> UpdateSession {
        self.cancel.store(false, Ordering::SeqCst);
        let mut session = UpdateSession::new(kind);
        init(&mut session);
        let detail = match kind {
            SessionKind::Update => "resolving target revision",
            SessionKind::Rollback => "restoring backup",
        };
        if let Ok(state) = fsm.process(event) {
            session.transition(state, detail);
        }
        *self.write_session() = Some(session.clone());
        self.persist(&session).await;
        session
    }

    async fn persist(&self, session: &UpdateSession) {
        if let Err(e) = self.parts.store.save(session).await {
            warn!("Failed to persist session {}: {}", session.id, e);
        }
    }

    /// Feed `event` to the FSM and mirror the result into the session
    async fn advance(
        &self,
        fsm: &mut UpdateFsm,
        event: UpdateEvent,
        detail: impl Into<String>,
        update: impl FnOnce(&mut UpdateSession),
    ) {
        let state = match fsm.process(event) {
            Ok(state) => state,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        let snapshot = {
            let mut guard = self.write_session();
            let Some(session) = guard.as_mut() else {
                return;
            };
            update(session);
            session.transition(state, detail);
            session.clone()
        };
        info!(
            "Session {} -> {} ({})",
            snapshot.id,
            snapshot.state.as_str(),
            snapshot.detail_message
        );
        self.persist(&snapshot).await;
    }

    fn checkpoint(&self) -> Result<(), Failure> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(Failure::Abort(UpdateError::Cancelled(
                "cancelled before any file was changed".to_string(),
            )));
        }
        Ok(())
    }

    /// BackingUp -> Applying, refused when a cancel landed first
    async fn enter_applying(&self, fsm: &mut UpdateFsm, backup_id: &str) -> Result<(), Failure> {
        let snapshot = {
            let mut guard = self.write_session();
            // Checked under the session lock so `cancel()` cannot slip in between
            self.checkpoint()?;
            let state = fsm
                .process(UpdateEvent::BackupOk)
                .map_err(|e| Failure::Abort(UpdateError::Internal(e)))?;
            guard.as_mut().map(|session| {
                session.backup_id = Some(backup_id.to_string());
                session.transition(state, "stopping service and replacing files");
                session.clone()
            })
        };
        if let Some(snapshot) = snapshot {
            info!("Session {} -> {}", snapshot.id, snapshot.state.as_str());
            self.persist(&snapshot).await;
        }
        Ok(())
    }

    async fn run_update(&self, mut fsm: UpdateFsm, target: Option<String>) {
        let mut staged: Option<Dir> = None;
        let result = self.update_pipeline(&mut fsm, target, &mut staged).await;

        match result {
            Ok(()) => {}
            Err(Failure::Abort(e)) => {
                warn!("Update aborted before any change: {}", e);
                let detail = format!("aborted: {}", e);
                self.advance(&mut fsm, UpdateEvent::Abort(e.to_string()), detail, |s| {
                    s.error = Some((&e).into());
                })
                .await;
            }
            Err(Failure::Fault { error, backup_id }) => {
                error!("Update failed after changing files: {}", error);
                let detail = format!("{}; restoring backup {}", error, backup_id);
                self.advance(&mut fsm, UpdateEvent::Fault(error.to_string()), detail, |s| {
                    s.error = Some((&error).into());
                })
                .await;
                self.restore_and_restart(&mut fsm, &backup_id, true).await;
            }
        }

        if let Some(dir) = staged {
            self.parts.staging.discard(&dir).await;
        }
    }

    async fn update_pipeline(
        &self,
        fsm: &mut UpdateFsm,
        target: Option<String>,
        staged: &mut Option<Dir>,
    ) -> Result<(), Failure> {
        let parts = &self.parts;

        let source_revision = parts
            .source
            .current_version()
            .await
            .map_err(Failure::Abort)?;
        let target = match target {
            Some(target) => target,
            None => parts
                .source
                .latest_revision()
                .await
                .map_err(Failure::Abort)?,
        };
        {
            let mut guard = self.write_session();
            if let Some(session) = guard.as_mut() {
                session.source_revision = Some(source_revision.clone());
                session.target_revision = Some(target.clone());
            }
        }

        if source_revision == target {
            self.advance(
                fsm,
                UpdateEvent::AlreadyCurrent,
                format!("already at {}", short_revision(&target)),
                |_| {},
            )
            .await;
            return Ok(());
        }

        self.checkpoint()?;
        let session_id = self
            .read_session()
            .as_ref()
            .map(|s| s.id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let dir = parts
            .staging
            .prepare(&session_id)
            .await
            .map_err(Failure::Abort)?;
        *staged = Some(dir.clone());

        parts
            .source
            .materialize(&target, dir.path())
            .await
            .map_err(Failure::Abort)?;
        self.checkpoint()?;

        let report = parts.compat.check(dir.path()).await.map_err(Failure::Abort)?;
        if !report.is_compatible() {
            let summary = report.summary();
            warn!("Candidate {} rejected: {}", short_revision(&target), summary);
            let error = UpdateError::CompatibilityFailed(summary.clone());
            self.advance(
                fsm,
                UpdateEvent::CompatibilityRejected(summary),
                "candidate rejected by compatibility check",
                |s| s.error = Some((&error).into()),
            )
            .await;
            return Ok(());
        }

        let plan = parts.applier.plan(&dir).map_err(Failure::Abort)?;
        self.advance(
            fsm,
            UpdateEvent::CompatibilityOk,
            format!("backing up {} files", plan.len()),
            |_| {},
        )
        .await;
        self.checkpoint()?;

        let record = parts
            .backups
            .create(&parts.descriptor, &source_revision, &plan)
            .await
            .map_err(Failure::Abort)?;
        self.enter_applying(fsm, &record.id).await?;

        // Stopping is the last step that leaves the tree untouched
        parts.service.stop().await.map_err(Failure::Abort)?;

        let outcome = parts.applier.apply(&dir, &parts.descriptor, &target).await;
        let files_changed = outcome.files_changed.clone();
        {
            let mut guard = self.write_session();
            if let Some(session) = guard.as_mut() {
                session.files_changed = files_changed;
            }
        }
        let fault = |error: UpdateError| Failure::Fault {
            error,
            backup_id: record.id.clone(),
        };
        let outcome = outcome.into_result().map_err(fault)?;

        self.advance(
            fsm,
            UpdateEvent::ApplyOk,
            format!("starting service on {}", short_revision(&target)),
            |_| {},
        )
        .await;
        parts.service.start().await.map_err(fault)?;

        self.advance(fsm, UpdateEvent::StartOk, "waiting for health probe", |_| {})
            .await;
        parts
            .service
            .health_check(parts.health_timeout)
            .await
            .map_err(fault)?;

        self.advance(
            fsm,
            UpdateEvent::HealthOk,
            format!(
                "updated {} -> {} ({} files)",
                short_revision(&source_revision),
                short_revision(&target),
                outcome.files_changed.len()
            ),
            |_| {},
        )
        .await;

        self.prune_backups().await;
        Ok(())
    }

    async fn prune_backups(&self) {
        match self.parts.backups.prune(self.parts.retain).await {
            Ok(removed) if !removed.is_empty() => info!("Pruned {} old backups", removed.len()),
            Ok(_) => {}
            Err(e) => warn!("Failed to prune backups: {}", e),
        }
    }

    /// Carry a session found mid-flight at startup to a terminal state
    async fn resume_interrupted(&self, fsm: &mut UpdateFsm, backup_id: &str) {
        let previous = fsm.state();
        // A container restart ends the update and restarts this process with it
        let restarted = self.parts.descriptor.kind == DeploymentKind::ContainerDocker;

        match previous {
            UpdateState::Restarting | UpdateState::Verifying => {
                let Err(error) = self.resume_verification(fsm, restarted).await else {
                    return;
                };
                error!("Resumed update did not come up healthy: {}", error);
                let detail = format!("{}; restoring backup {}", error, backup_id);
                self.advance(fsm, UpdateEvent::Fault(error.to_string()), detail, |s| {
                    s.error = Some((&error).into());
                })
                .await;
                self.restore_and_restart(fsm, backup_id, true).await;
            }
            UpdateState::Applying => {
                let error = UpdateError::Internal(format!(
                    "Updater stopped while session was {}",
                    previous.as_str()
                ));
                let detail = format!(
                    "interrupted during {}; restoring backup {}",
                    previous.as_str(),
                    backup_id
                );
                self.advance(fsm, UpdateEvent::Fault(error.to_string()), detail, |s| {
                    s.error = Some((&error).into());
                })
                .await;
                self.restore_and_restart(fsm, backup_id, true).await;
            }
            UpdateState::RollingBack => {
                self.restore_and_restart(fsm, backup_id, !restarted).await;
            }
            other => warn!("Nothing to resume in state {}", other.as_str()),
        }
    }

    /// Restarting | Verifying -> Completed, or the error that should trigger a rollback
    async fn resume_verification(
        &self,
        fsm: &mut UpdateFsm,
        already_restarted: bool,
    ) -> Result<(), UpdateError> {
        let parts = &self.parts;
        if fsm.state() == UpdateState::Restarting {
            if !already_restarted {
                parts.service.start().await?;
            }
            self.advance(fsm, UpdateEvent::StartOk, "waiting for health probe", |_| {})
                .await;
        }
        parts.service.health_check(parts.health_timeout).await?;

        let target = self
            .read_session()
            .as_ref()
            .and_then(|s| s.target_revision.clone())
            .unwrap_or_default();
        self.advance(
            fsm,
            UpdateEvent::HealthOk,
            format!("updated to {} after restart", short_revision(&target)),
            |_| {},
        )
        .await;
        self.prune_backups().await;
        Ok(())
    }

    /// RollingBack -> RolledBack | Failed
    ///
    /// Without `restart` the service is only probed; used when it has just
    /// come back up on the restored files by itself.
    async fn restore_and_restart(&self, fsm: &mut UpdateFsm, backup_id: &str, restart: bool) {
        let parts = &self.parts;

        if restart {
            if let Err(e) = parts.service.stop().await {
                warn!("Stopping service before restore failed: {}", e);
            }
        }

        let record = match parts.backups.restore(backup_id, &parts.descriptor).await {
            Ok(record) => record,
            Err(e) => {
                let error = match e {
                    UpdateError::RollbackFailed(_) | UpdateError::NotFound(_) => e,
                    other => UpdateError::RollbackFailed(other.to_string()),
                };
                error!(
                    "ROLLBACK FAILED for backup {}: {}. Manual intervention required",
                    backup_id, error
                );
                let detail = format!("rollback failed: {}", error);
                self.advance(fsm, UpdateEvent::RollbackFailed(error.to_string()), detail, |s| {
                    s.error = Some((&error).into());
                })
                .await;
                return;
            }
        };

        {
            let mut guard = self.write_session();
            if let Some(session) = guard.as_mut() {
                if session.kind == SessionKind::Rollback {
                    session.files_changed = record.manifest.keys().cloned().collect();
                }
            }
        }

        let started = if restart {
            parts.service.start().await
        } else {
            Ok(())
        };
        if let Err(e) = started {
            error!("Service did not start after restoring {}: {}", backup_id, e);
            let detail = format!("restored {} but service did not start: {}", backup_id, e);
            self.advance(fsm, UpdateEvent::RollbackFailed(e.to_string()), detail, |s| {
                s.error = Some((&e).into());
            })
            .await;
            return;
        }

        if let Err(e) = parts.service.health_check(parts.health_timeout).await {
            warn!("Service unhealthy after restoring {}: {}", backup_id, e);
        }

        self.advance(
            fsm,
            UpdateEvent::RollbackOk,
            format!(
                "restored {} (revision {})",
                backup_id,
                short_revision(&record.source_revision)
            ),
            |_| {},
        )
        .await;
    }
}

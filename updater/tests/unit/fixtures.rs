//! Shared test fixtures

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::Semaphore;

use vox_updater::backup::BackupArchive;
use vox_updater::compat::{CompatibilityChecker, StaticInventory};
use vox_updater::deploy::applier::UpdateApplier;
use vox_updater::deploy::session::SessionStore;
use vox_updater::deploy::staging::Staging;
use vox_updater::deploy::{OrchestratorParts, UpdateOrchestrator};
use vox_updater::detect::{DeploymentDescriptor, DeploymentKind, ServiceHandle};
use vox_updater::errors::UpdateError;
use vox_updater::marker::VersionMarker;
use vox_updater::remote::source::VersionSource;
use vox_updater::remote::{CommitSummary, RemoteRepository};
use vox_updater::service::health::wait_healthy;
use vox_updater::service::{HealthProbe, ServiceControl};
use vox_updater::storage::layout::StorageLayout;

pub const HEALTH_TIMEOUT: Duration = Duration::from_millis(200);
pub const WAIT: Duration = Duration::from_secs(10);

pub type Tree = BTreeMap<String, String>;

pub fn tree(files: &[(&str, &str)]) -> Tree {
    files
        .iter()
        .map(|(path, contents)| (path.to_string(), contents.to_string()))
        .collect()
}

/// Every file below `root`, keyed by `/`-separated relative path
pub fn read_tree(root: &Path) -> Tree {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, std::fs::read_to_string(e.path()).unwrap())
        })
        .collect()
}

pub fn write_tree(root: &Path, files: &Tree) {
    for (rel, contents) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

// ================================ REMOTE ================================ //

/// In-memory repository: commits oldest first, each with its full tree
pub struct FakeRemote {
    commits: Mutex<Vec<(CommitSummary, Tree)>>,
    pub unavailable: AtomicBool,
    /// When set, `materialize` waits for a permit
    pub gate: Option<Arc<Semaphore>>,
    pub materialize_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            commits: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            gate: None,
            materialize_calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn push(&self, id: &str, message: &str, files: Tree) {
        let mut commits = self.commits.lock().unwrap();
        let n = commits.len() as i64;
        commits.push((
            CommitSummary {
                id: id.to_string(),
                message: message.to_string(),
                timestamp: Some(Utc.timestamp_opt(1_700_000_000 + n * 60, 0).unwrap()),
            },
            files,
        ));
    }

    fn check_available(&self) -> Result<(), UpdateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(UpdateError::RemoteUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .position(|(c, _)| c.id == id)
    }
}

#[async_trait]
impl RemoteRepository for FakeRemote {
    fn name(&self) -> &str {
        "fake"
    }

    async fn latest_revision(&self) -> Result<String, UpdateError> {
        self.check_available()?;
        self.commits
            .lock()
            .unwrap()
            .last()
            .map(|(c, _)| c.id.clone())
            .ok_or_else(|| UpdateError::NotFound("empty repository".to_string()))
    }

    async fn commits_between(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, UpdateError> {
        self.check_available()?;
        let base = self
            .position(base)
            .ok_or_else(|| UpdateError::NotFound(format!("unknown revision {}", base)))?;
        let head = self
            .position(head)
            .ok_or_else(|| UpdateError::NotFound(format!("unknown revision {}", head)))?;
        let commits = self.commits.lock().unwrap();
        Ok(commits[base + 1..=head]
            .iter()
            .rev()
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError> {
        self.check_available()?;
        let commits = self.commits.lock().unwrap();
        Ok(commits
            .iter()
            .rev()
            .take(limit)
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn materialize(&self, revision: &str, dest: &Path) -> Result<(), UpdateError> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.check_available()?;
        let files = self
            .commits
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.id == revision)
            .map(|(_, files)| files.clone())
            .ok_or_else(|| UpdateError::NotFound(format!("unknown revision {}", revision)))?;
        write_tree(dest, &files);
        Ok(())
    }
}

// ================================ SERVICE ================================ //

/// Probe that never answers within any reasonable timeout
pub struct HangingProbe;

#[async_trait]
impl HealthProbe for HangingProbe {
    async fn probe(&self) -> Result<(), String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

pub struct HealthyProbe;

#[async_trait]
impl HealthProbe for HealthyProbe {
    async fn probe(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Records stop/start calls; health is delegated to a probe
pub struct RecordingService {
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_stop: AtomicBool,
    pub fail_start: AtomicBool,
    probe: Arc<dyn HealthProbe>,
}

impl RecordingService {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_stop: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            probe,
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceControl for RecordingService {
    async fn stop(&self) -> Result<(), UpdateError> {
        self.calls.lock().unwrap().push("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(UpdateError::ApplyFailed("Could not stop service".to_string()));
        }
        Ok(())
    }

    async fn start(&self) -> Result<(), UpdateError> {
        self.calls.lock().unwrap().push("start");
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(UpdateError::RestartFailed("unit failed to start".to_string()));
        }
        Ok(())
    }

    async fn restart(&self) -> Result<(), UpdateError> {
        self.stop().await?;
        self.start().await
    }

    async fn health_check(&self, timeout: Duration) -> Result<(), UpdateError> {
        self.calls.lock().unwrap().push("health");
        wait_healthy(self.probe.as_ref(), timeout, Duration::from_millis(20)).await
    }
}

// ================================ HARNESS ================================ //

pub struct Harness {
    pub install: TempDir,
    pub data: TempDir,
    pub remote: Arc<FakeRemote>,
    pub service: Arc<RecordingService>,
    pub orchestrator: UpdateOrchestrator,
}

pub struct HarnessOptions {
    pub live: Tree,
    pub installed_revision: &'static str,
    pub inventory: Vec<(&'static str, &'static str)>,
    pub internal_modules: Vec<String>,
    pub probe: Arc<dyn HealthProbe>,
    pub retain: usize,
    pub kind: DeploymentKind,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            live: tree(&[("app/server.py", "v1 server"), ("requirements.txt", "numpy>=1.24\n")]),
            installed_revision: "r1",
            inventory: vec![("numpy", "1.26.4")],
            internal_modules: Vec::new(),
            probe: Arc::new(HealthyProbe),
            retain: 5,
            kind: DeploymentKind::Development,
        }
    }
}

impl Harness {
    pub fn new(remote: FakeRemote, options: HarnessOptions) -> Self {
        let install = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        write_tree(install.path(), &options.live);
        std::fs::write(
            install.path().join("VERSION"),
            format!("{}\n", options.installed_revision),
        )
        .unwrap();

        let remote = Arc::new(remote);
        let service = Arc::new(RecordingService::new(options.probe));
        let layout = StorageLayout::new(data.path());
        let descriptor = DeploymentDescriptor {
            kind: options.kind,
            install_root: install.path().to_path_buf(),
            service_handle: ServiceHandle::Unmanaged,
            writable_permissions: true,
        };

        let inventory: Vec<(&str, &str)> = options.inventory.clone();
        let parts = OrchestratorParts {
            source: VersionSource::new(
                VersionMarker::new(install.path(), "VERSION"),
                remote.clone(),
                Duration::from_secs(5),
                Duration::from_secs(5),
                50,
            ),
            compat: CompatibilityChecker::new(
                "requirements.txt",
                options.internal_modules,
                Box::new(StaticInventory::from_pairs(&inventory)),
            ),
            backups: BackupArchive::new(layout.backups_dir(), "VERSION", 0),
            applier: UpdateApplier::new(&[".github".to_string()], "VERSION"),
            service: service.clone(),
            staging: Staging::new(layout.staging_dir(), install.path()).unwrap(),
            store: SessionStore::new(layout.session_file()),
            health_timeout: HEALTH_TIMEOUT,
            retain: options.retain,
            descriptor,
        };

        Self {
            install,
            data,
            remote,
            service,
            orchestrator: UpdateOrchestrator::new(parts),
        }
    }

    pub fn marker(&self) -> String {
        std::fs::read_to_string(self.install.path().join("VERSION"))
            .unwrap()
            .trim()
            .to_string()
    }

    pub fn live_tree(&self) -> Tree {
        read_tree(self.install.path())
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data.path().join("backups")
    }

    pub fn backup_count(&self) -> usize {
        std::fs::read_dir(self.backups_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

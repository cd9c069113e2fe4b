//! Application state: wiring settings into an orchestrator

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::backup::BackupArchive;
use crate::compat::{CommandInventory, CompatibilityChecker};
use crate::deploy::applier::UpdateApplier;
use crate::deploy::session::SessionStore;
use crate::deploy::staging::Staging;
use crate::deploy::{OrchestratorParts, UpdateOrchestrator};
use crate::detect::{DeploymentDescriptor, Detector};
use crate::errors::UpdateError;
use crate::remote::source::VersionSource;
use crate::service::{HttpHealthProbe, ServiceController};
use crate::storage::layout::StorageLayout;
use crate::storage::lock::InstanceLock;
use crate::storage::settings::Settings;

/// Main application state
pub struct AppState {
    pub settings: Settings,
    pub layout: StorageLayout,
    pub orchestrator: UpdateOrchestrator,
    /// Present when this process owns the install tree
    lock: Option<InstanceLock>,
}

/// Classify the runtime for `settings`
pub fn detect(settings: &Settings) -> DeploymentDescriptor {
    Detector {
        fs_root: PathBuf::from("/"),
        install_root: settings.install_root.clone(),
        service_name: settings.service.name.clone(),
        container_name: settings.service.container_name.clone(),
        start_command: settings.service.start_command.clone(),
    }
    .detect()
}

impl AppState {
    /// Initialize application state as the owner of the install tree.
    ///
    /// Fails with `UpdateInProgress` while another process holds the
    /// instance lock; nothing is recovered or cleared in that case.
    pub async fn init(settings: Settings) -> Result<Self, UpdateError> {
        info!("Initializing application state...");

        let layout = StorageLayout::new(&settings.data_dir);
        layout.setup().await?;
        let lock = InstanceLock::try_acquire(&layout.lock_file())?;

        let descriptor = detect(&settings);
        info!(
            "Deployment: {} at {} (service {})",
            descriptor.kind,
            descriptor.install_root.display(),
            descriptor.service_handle
        );

        let orchestrator = UpdateOrchestrator::new(build_parts(&settings, &layout, descriptor)?);
        if let Some(session) = orchestrator.recover().await? {
            info!(
                "Last session {} ended {} ({})",
                session.id,
                session.state.as_str(),
                session.detail_message
            );
        }

        Ok(Self {
            settings,
            layout,
            orchestrator,
            lock: Some(lock),
        })
    }

    /// Read-only state for status queries; never takes the lock or recovers
    pub async fn observe(settings: Settings) -> Result<Self, UpdateError> {
        let layout = StorageLayout::new(&settings.data_dir);
        let orchestrator = UpdateOrchestrator::new(build_parts(&settings, &layout, detect(&settings))?);
        orchestrator.load_session().await;

        Ok(Self {
            settings,
            layout,
            orchestrator,
            lock: None,
        })
    }

    pub fn owns_install(&self) -> bool {
        self.lock.is_some()
    }
}

/// Assemble the production collaborators
pub fn build_parts(
    settings: &Settings,
    layout: &StorageLayout,
    descriptor: DeploymentDescriptor,
) -> Result<OrchestratorParts, UpdateError> {
    let service = &settings.service;

    let probe = Arc::new(HttpHealthProbe::new(
        &service.health_url,
        service.health_poll_interval().max(std::time::Duration::from_secs(5)),
    )?);
    let controller = ServiceController::new(
        &descriptor,
        probe,
        service.command_timeout(),
        service.health_poll_interval(),
    );

    let compat = CompatibilityChecker::new(
        &settings.compatibility.requirements_file,
        settings.compatibility.internal_modules.clone(),
        Box::new(CommandInventory::new(
            settings.compatibility.inventory_command.clone(),
            service.command_timeout(),
        )),
    );

    Ok(OrchestratorParts {
        source: VersionSource::from_settings(settings, layout)?,
        compat,
        backups: BackupArchive::new(
            layout.backups_dir(),
            &settings.marker_file,
            settings.backups.min_free_bytes,
        ),
        applier: UpdateApplier::new(&settings.apply.excluded_paths, &settings.marker_file),
        service: Arc::new(controller),
        staging: Staging::new(layout.staging_dir(), &descriptor.install_root)?,
        store: SessionStore::new(layout.session_file()),
        health_timeout: service.health_timeout(),
        retain: settings.backups.retain,
        descriptor,
    })
}

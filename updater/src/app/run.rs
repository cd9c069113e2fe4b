//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::deploy::session::UpdateSession;
use crate::deploy::UpdateOrchestrator;
use crate::errors::UpdateError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::checker;

/// Run the updater daemon until `shutdown_signal` resolves
pub async fn run(
    app_state: AppState,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), UpdateError> {
    info!("Starting vox-updater daemon...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let orchestrator = app_state.orchestrator.clone();
    let app_state = Arc::new(app_state);
    if let Err(e) = init(&options, app_state, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start updater: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    let result = shutdown_manager.shutdown().await;
    finish_session(&orchestrator, options.lifecycle.max_session_wait).await;
    result
}

/// Let a running session reach a terminal state before the process exits.
///
/// Returns the settled session, or `None` when nothing was running or the
/// wait ran out; the next start restores the backup in that case.
pub async fn finish_session(
    orchestrator: &UpdateOrchestrator,
    limit: Duration,
) -> Option<UpdateSession> {
    if !orchestrator.is_busy() {
        return None;
    }
    info!("Waiting up to {:?} for the running session to finish", limit);
    match orchestrator.wait_for_terminal(limit).await {
        Ok(session) => {
            info!("Session {} ended {}", session.id, session.state.as_str());
            Some(session)
        }
        Err(e) => {
            warn!("{}; it will be settled on next start", e);
            None
        }
    }
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), UpdateError> {
    if options.enable_admin_server {
        init_admin_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    if options.enable_checker {
        init_checker_worker(
            options.checker.clone(),
            app_state,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(())
}

fn init_checker_worker(
    options: checker::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), UpdateError> {
    info!("Initializing checker worker (every {:?})...", options.interval);

    let orchestrator = app_state.orchestrator.clone();
    let handle = tokio::spawn(async move {
        checker::run(
            &options,
            &orchestrator,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
        Ok(())
    });

    shutdown_manager.register("checker", handle)
}

async fn init_admin_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), UpdateError> {
    info!("Initializing admin API...");

    let server_state = ServerState::new(
        app_state.orchestrator.clone(),
        app_state.settings.repository.changelog_limit.max(100),
    );

    let handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.register("admin server", handle)
}

// ================================= SHUTDOWN ===================================== //

type Task = JoinHandle<Result<(), UpdateError>>;

/// Background tasks joined in registration order on shutdown
struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    tasks: Vec<(&'static str, Task)>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            tasks: Vec::new(),
        }
    }

    fn register(&mut self, name: &'static str, handle: Task) -> Result<(), UpdateError> {
        if self.tasks.iter().any(|(existing, _)| *existing == name) {
            return Err(UpdateError::ShutdownError(format!("{} already registered", name)));
        }
        self.tasks.push((name, handle));
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), UpdateError> {
        let _ = self.shutdown_tx.send(());

        let max_delay = self.lifecycle_options.max_shutdown_delay;
        match tokio::time::timeout(max_delay, self.join_all()).await {
            Ok(result) => result,
            Err(_) => {
                error!("Shutdown timed out after {:?}, forcing exit", max_delay);
                std::process::exit(1);
            }
        }
    }

    async fn join_all(&mut self) -> Result<(), UpdateError> {
        info!("Shutting down vox-updater...");

        for (name, handle) in self.tasks.drain(..) {
            debug!("Waiting for {}", name);
            handle
                .await
                .map_err(|e| UpdateError::ShutdownError(format!("{}: {}", name, e)))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

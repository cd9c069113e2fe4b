//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::UpdateError;
use crate::server::handlers::{
    apply_handler, backups_handler, cancel_handler, check_handler, health_handler,
    history_handler, rollback_handler, status_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the admin API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Remote
        .route("/check", post(check_handler))
        .route("/history", get(history_handler))
        // Sessions
        .route("/status", get(status_handler))
        .route("/apply", post(apply_handler))
        .route("/rollback", post(rollback_handler))
        .route("/cancel", post(cancel_handler))
        // Backups
        .route("/backups", get(backups_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), UpdateError>>, UpdateError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting admin API on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| UpdateError::ServerError(format!("Failed to bind {}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| UpdateError::ServerError(e.to_string()))
    });

    Ok(handle)
}

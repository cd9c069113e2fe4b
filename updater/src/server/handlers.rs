//! HTTP request handlers

use std::sync::Arc;

use admin_api::{
    ApplyRequest, BackupListResponse, CancelResponse, ErrorResponse, HealthResponse,
    HistoryResponse, RollbackRequest, VersionResponse,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{error, warn};

use crate::errors::UpdateError;
use crate::server::state::ServerState;
use crate::server::views;
use crate::utils::build_info;

/// Error wrapper rendered as `{error, message}` JSON
pub struct ApiError(pub UpdateError);

impl From<UpdateError> for ApiError {
    fn from(e: UpdateError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            UpdateError::UpdateInProgress(_) => StatusCode::CONFLICT,
            UpdateError::NotFound(_) => StatusCode::NOT_FOUND,
            UpdateError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
            UpdateError::CompatibilityFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            UpdateError::JsonError(_) | UpdateError::InvalidRevision(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Empty bodies decode to the default request
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body).map_err(UpdateError::from)?)
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "vox-updater".to_string(),
        version: build_info().version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let build = build_info();
    Json(VersionResponse {
        version: build.version,
        git_hash: build.git_hash,
        build_time: build.build_time,
    })
}

/// Status handler
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let status = state.orchestrator.status().await;
    Json(views::status_response(&status))
}

/// Remote check handler
pub async fn check_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let info = state.orchestrator.check().await?;
    Ok(Json(views::version_info_view(&info)))
}

/// Apply handler
pub async fn apply_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: ApplyRequest = optional_body(&body)?;
    let started = state.orchestrator.apply(request.revision).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(views::session_started_response(&started)),
    ))
}

/// Rollback handler
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: RollbackRequest = optional_body(&body)?;
    let started = state.orchestrator.rollback(request.record_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(views::session_started_response(&started)),
    ))
}

/// Cancel handler
pub async fn cancel_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let cancelled = state.orchestrator.cancel();
    let message = if cancelled {
        "cancellation requested".to_string()
    } else {
        match state.orchestrator.session() {
            Some(session) if !session.is_terminal() => format!(
                "session is {}; too late to cancel",
                session.state.as_str()
            ),
            _ => "no session in progress".to_string(),
        }
    };
    Json(CancelResponse { cancelled, message })
}

/// Backups handler
pub async fn backups_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let backups: Vec<_> = state
        .orchestrator
        .backups()
        .await?
        .iter()
        .map(views::backup_view)
        .collect();
    let total = backups.len();
    Ok(Json(BackupListResponse { backups, total }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// History handler
pub async fn history_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, state.max_history.max(1));
    let commits: Vec<_> = state
        .orchestrator
        .history(limit)
        .await?
        .iter()
        .map(views::commit_view)
        .collect();
    let total = commits.len();
    Ok(Json(HistoryResponse { commits, total }))
}

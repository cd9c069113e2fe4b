//! Admin API tests

use std::sync::Arc;

use admin_api::{
    BackupListResponse, CancelResponse, ErrorResponse, HealthResponse, SessionStartedResponse,
    StatusResponse,
};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use vox_updater::server::serve::router;
use vox_updater::server::state::ServerState;

use crate::fixtures::{tree, FakeRemote, Harness, HarnessOptions, WAIT};

fn harness(remote: FakeRemote) -> Harness {
    remote.push("r1", "initial", tree(&[("app/server.py", "v1 server")]));
    remote.push("r2", "next", tree(&[("app/server.py", "v2 server")]));
    Harness::new(remote, HarnessOptions::default())
}

async fn send(harness: &Harness, method: &str, uri: &str, body: &str) -> Response {
    let app = router(Arc::new(ServerState::new(harness.orchestrator.clone(), 100)));
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let harness = harness(FakeRemote::new());
    let response = send(&harness, "GET", "/health", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: HealthResponse = json(response).await;
    assert_eq!(body.status, "healthy");
    assert_eq!(body.service, "vox-updater");
}

#[tokio::test]
async fn test_apply_accepted_then_status_reports_session() {
    let harness = harness(FakeRemote::new());

    let response = send(&harness, "POST", "/apply", "").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let started: SessionStartedResponse = json(response).await;
    assert_eq!(started.state, "checking");

    harness.orchestrator.wait_for_terminal(WAIT).await.unwrap();

    let status: StatusResponse = json(send(&harness, "GET", "/status", "").await).await;
    assert_eq!(status.current_version.as_deref(), Some("r2"));
    let session = status.session.unwrap();
    assert_eq!(session.id, started.session_id);
    assert_eq!(session.state, "completed");
    assert!(session.terminal);

    let backups: BackupListResponse = json(send(&harness, "GET", "/backups", "").await).await;
    assert_eq!(backups.total, 1);
    assert_eq!(backups.backups[0].source_revision, "r1");
}

#[tokio::test]
async fn test_second_apply_conflicts_while_running() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = harness(FakeRemote::gated(gate.clone()));

    let first = send(&harness, "POST", "/apply", r#"{"revision":"r2"}"#).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = send(&harness, "POST", "/apply", "").await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error: ErrorResponse = json(second).await;
    assert_eq!(error.error, "update_in_progress");

    gate.add_permits(1);
    harness.orchestrator.wait_for_terminal(WAIT).await.unwrap();
}

#[tokio::test]
async fn test_rollback_without_backups_is_404() {
    let harness = harness(FakeRemote::new());
    let response = send(&harness, "POST", "/rollback", "").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "not_found");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let harness = harness(FakeRemote::new());
    let response = send(&harness, "POST", "/apply", "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.orchestrator.session().is_none());
}

#[tokio::test]
async fn test_traversing_revision_is_400() {
    let harness = harness(FakeRemote::new());
    let response = send(&harness, "POST", "/apply", r#"{"revision":"../x"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(response).await;
    assert_eq!(error.error, "invalid_revision");
    assert!(harness.orchestrator.session().is_none());
}

#[tokio::test]
async fn test_cancel_without_session() {
    let harness = harness(FakeRemote::new());
    let body: CancelResponse = json(send(&harness, "POST", "/cancel", "").await).await;
    assert!(!body.cancelled);
    assert_eq!(body.message, "no session in progress");
}

//! Client for a running daemon's admin API

use std::time::Duration;

use admin_api::{
    ApplyRequest, BackupListResponse, ErrorResponse, HistoryResponse, RollbackRequest,
    SessionStartedResponse, StatusResponse, VersionInfoView,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::UpdateError;

pub struct AdminClient {
    client: Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    /// True when a daemon answers `GET /health`
    pub async fn is_reachable(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("No daemon at {}: {}", self.base_url, e);
                false
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, UpdateError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: ErrorResponse = response.json().await.unwrap_or_else(|_| ErrorResponse {
            error: "server_error".to_string(),
            message: status.to_string(),
        });
        Err(match body.error.as_str() {
            "update_in_progress" => UpdateError::UpdateInProgress(body.message),
            "not_found" => UpdateError::NotFound(body.message),
            "invalid_revision" => UpdateError::InvalidRevision(body.message),
            "remote_unavailable" => UpdateError::RemoteUnavailable(body.message),
            "compatibility_failed" => UpdateError::CompatibilityFailed(body.message),
            _ => UpdateError::ServerError(body.message),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpdateError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, UpdateError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn status(&self) -> Result<StatusResponse, UpdateError> {
        self.get("/status").await
    }

    pub async fn check(&self) -> Result<VersionInfoView, UpdateError> {
        self.post("/check", &serde_json::json!({})).await
    }

    pub async fn apply(&self, revision: Option<String>) -> Result<SessionStartedResponse, UpdateError> {
        self.post("/apply", &ApplyRequest { revision }).await
    }

    pub async fn rollback(
        &self,
        record_id: Option<String>,
    ) -> Result<SessionStartedResponse, UpdateError> {
        self.post("/rollback", &RollbackRequest { record_id }).await
    }

    pub async fn backups(&self) -> Result<BackupListResponse, UpdateError> {
        self.get("/backups").await
    }

    pub async fn history(&self, limit: usize) -> Result<HistoryResponse, UpdateError> {
        self.get(&format!("/history?limit={}", limit)).await
    }
}

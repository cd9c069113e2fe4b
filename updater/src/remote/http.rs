//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::UpdateError;

/// HTTP client for the repository hosting API
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vox-updater/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, path: &str, accept: &str) -> Result<reqwest::Response, UpdateError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.client.get(&url).header(header::ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpdateError::RemoteUnavailable(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpdateError::NotFound(format!("GET {}: {}", url, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("HTTP GET failed: {} - {}", status, body);
            return Err(UpdateError::RemoteUnavailable(format!("{}: {}", status, body)));
        }

        Ok(response)
    }

    /// Make a GET request and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, UpdateError> {
        let response = self.send(path, "application/vnd.github+json").await?;
        response
            .json()
            .await
            .map_err(|e| UpdateError::RemoteUnavailable(format!("Invalid response body: {}", e)))
    }

    /// Make a GET request and return the raw body
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, UpdateError> {
        let response = self.send(path, "application/octet-stream").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpdateError::RemoteUnavailable(format!("Download interrupted: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

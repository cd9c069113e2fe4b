//! Liveness probing of the hosted application

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::errors::UpdateError;

/// One liveness probe attempt
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(())` when the service reports healthy
    async fn probe(&self) -> Result<(), String>;
}

/// HTTP GET against the application's local health URL
pub struct HttpHealthProbe {
    client: Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> Result<(), String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("GET {} failed: {}", self.url, e))?;
        let status = response.status();
        debug!("Health probe {} -> {}", self.url, status);
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("GET {} returned {}", self.url, status))
        }
    }
}

/// Probe every `interval` until healthy or `timeout` elapses
pub async fn wait_healthy(
    probe: &dyn HealthProbe,
    timeout: Duration,
    interval: Duration,
) -> Result<(), UpdateError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let last_error = match tokio::time::timeout(remaining, probe.probe()).await {
            Ok(Ok(())) => {
                debug!("Service healthy after {} attempts", attempts);
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => "probe did not answer in time".to_string(),
        };

        if tokio::time::Instant::now() + interval >= deadline {
            return Err(UpdateError::HealthCheckFailed(format!(
                "not healthy after {:?} ({} attempts): {}",
                timeout, attempts, last_error
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

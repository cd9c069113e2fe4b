//! Control of the hosted service process

pub mod controller;
pub mod health;

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::UpdateError;

pub use controller::ServiceController;
pub use health::{HealthProbe, HttpHealthProbe};

/// Stop/start seam used by the orchestrator
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn stop(&self) -> Result<(), UpdateError>;

    async fn start(&self) -> Result<(), UpdateError>;

    async fn restart(&self) -> Result<(), UpdateError>;

    /// Poll until healthy; `HealthCheckFailed` once `timeout` elapses
    async fn health_check(&self, timeout: Duration) -> Result<(), UpdateError>;
}

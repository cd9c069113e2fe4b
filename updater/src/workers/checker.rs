//! Periodic remote check worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::deploy::UpdateOrchestrator;
use crate::utils::Backoff;

/// Checker worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between successful checks
    pub interval: Duration,
    pub initial_delay: Duration,
    /// Retry schedule after consecutive failures, never longer than `interval`
    pub backoff: Backoff,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 3600),
            initial_delay: Duration::from_secs(30),
            backoff: Backoff::default(),
        }
    }
}

/// Run the checker worker. Only records the result; never starts an update.
pub async fn run<S, F>(
    options: &Options,
    orchestrator: &UpdateOrchestrator,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Checker worker starting...");

    let mut wait = options.initial_delay;
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Checker worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }

        debug!("Checking remote for updates...");
        match orchestrator.check().await {
            Ok(info) => {
                failures = 0;
                wait = options.interval;
                if info.update_available() {
                    info!(
                        "Update available: {} -> {} ({} commits)",
                        info.local_revision,
                        info.remote_revision,
                        info.commits_behind
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                } else {
                    debug!("Up to date at {}", info.local_revision);
                }
            }
            Err(e) => {
                wait = options.backoff.delay(failures).min(options.interval);
                failures = failures.saturating_add(1);
                error!("Remote check failed (retrying in {:?}): {}", wait, e);
            }
        }
    }
}

//! Primary/secondary remote composition

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::UpdateError;
use crate::remote::{CommitSummary, RemoteRepository};

/// Tries the primary remote first and the secondary before giving up.
///
/// Each attempt carries its own time limit, so a hanging primary turns
/// into an ordinary failure and the secondary still gets its turn.
pub struct FallbackRemote {
    primary: Arc<dyn RemoteRepository>,
    secondary: Option<Arc<dyn RemoteRepository>>,
    query_timeout: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

impl FallbackRemote {
    pub fn new(
        primary: Arc<dyn RemoteRepository>,
        secondary: Option<Arc<dyn RemoteRepository>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            query_timeout: None,
            fetch_timeout: None,
        }
    }

    /// Bound every metadata query and every materialize per backend
    pub fn with_timeouts(mut self, query: Duration, fetch: Duration) -> Self {
        self.query_timeout = Some(query);
        self.fetch_timeout = Some(fetch);
        self
    }

    /// Number of backends a call may go through
    pub fn backends(&self) -> u32 {
        if self.secondary.is_some() {
            2
        } else {
            1
        }
    }

    fn combine(&self, op: &str, first: UpdateError, second: Option<UpdateError>) -> UpdateError {
        match second {
            // Both sides agree the object does not exist
            Some(UpdateError::NotFound(msg)) if matches!(first, UpdateError::NotFound(_)) => {
                UpdateError::NotFound(msg)
            }
            Some(second) => UpdateError::RemoteUnavailable(format!(
                "{} failed via {} ({}) and {} ({})",
                op,
                self.primary.name(),
                first,
                self.secondary.as_ref().map(|s| s.name()).unwrap_or("-"),
                second
            )),
            None => match first {
                UpdateError::NotFound(msg) => UpdateError::NotFound(msg),
                UpdateError::RemoteUnavailable(msg) => UpdateError::RemoteUnavailable(msg),
                other => UpdateError::RemoteUnavailable(format!(
                    "{} failed via {}: {}",
                    op,
                    self.primary.name(),
                    other
                )),
            },
        }
    }
}

async fn attempt<T>(
    limit: Option<Duration>,
    backend: &str,
    fut: impl Future<Output = Result<T, UpdateError>>,
) -> Result<T, UpdateError> {
    let Some(limit) = limit else {
        return fut.await;
    };
    tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
        Err(UpdateError::RemoteUnavailable(format!(
            "{} timed out after {:?}",
            backend, limit
        )))
    })
}

macro_rules! with_fallback {
    ($self:ident, $op:expr, $limit:expr, |$remote:ident| $call:expr) => {{
        let $remote = &$self.primary;
        match attempt($limit, $remote.name(), $call).await {
            Ok(value) => Ok(value),
            Err(first) => match &$self.secondary {
                Some(secondary) => {
                    warn!(
                        "{} via {} failed ({}), trying {}",
                        $op,
                        $self.primary.name(),
                        first,
                        secondary.name()
                    );
                    let $remote = secondary;
                    match attempt($limit, $remote.name(), $call).await {
                        Ok(value) => Ok(value),
                        Err(second) => Err($self.combine($op, first, Some(second))),
                    }
                }
                None => Err($self.combine($op, first, None)),
            },
        }
    }};
}

#[async_trait]
impl RemoteRepository for FallbackRemote {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn latest_revision(&self) -> Result<String, UpdateError> {
        with_fallback!(self, "latest_revision", self.query_timeout, |remote| remote.latest_revision())
    }

    async fn commits_between(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, UpdateError> {
        with_fallback!(self, "commits_between", self.query_timeout, |remote| remote
            .commits_between(base, head))
    }

    async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError> {
        with_fallback!(self, "history", self.query_timeout, |remote| remote.history(limit))
    }

    async fn materialize(&self, revision: &str, dest: &Path) -> Result<(), UpdateError> {
        with_fallback!(self, "materialize", self.fetch_timeout, |remote| async {
            // A failed attempt may leave a partial tree behind
            clear_dir(dest).await?;
            remote.materialize(revision, dest).await
        })
    }
}

async fn clear_dir(dir: &Path) -> Result<(), UpdateError> {
    if tokio::fs::metadata(dir).await.is_ok() {
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

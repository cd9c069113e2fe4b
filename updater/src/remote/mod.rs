//! Remote repository access and version resolution

pub mod archive;
pub mod fallback;
pub mod git;
pub mod http;
pub mod source;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::UpdateError;

/// One commit in a changelog or history listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Read-only view of the remote code source for one tracked branch
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &str;

    /// Newest revision of the tracked branch
    async fn latest_revision(&self) -> Result<String, UpdateError>;

    /// Commits reachable from `head` but not from `base`, newest first.
    ///
    /// `NotFound` when `base` is unknown to the remote.
    async fn commits_between(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, UpdateError>;

    /// Newest-first history of the tracked branch
    async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError>;

    /// Write the full file tree of `revision` into the empty directory `dest`
    async fn materialize(&self, revision: &str, dest: &Path) -> Result<(), UpdateError>;
}

/// Accept a hex object id or a plain ref name such as `main` or `release/1.4`.
///
/// Revisions end up as git arguments and in download file names, so option
/// lookalikes, path traversal and anything outside `[A-Za-z0-9._/-]` are
/// refused.
pub fn validate_revision(revision: &str) -> Result<(), UpdateError> {
    let plain = !revision.is_empty()
        && revision.len() <= 255
        && !revision.starts_with(['-', '/', '.'])
        && !revision.ends_with(['/', '.'])
        && !revision.ends_with(".lock")
        && !revision.contains("..")
        && !revision.contains("//")
        && !revision.contains("/.")
        && revision
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if plain {
        Ok(())
    } else {
        Err(UpdateError::InvalidRevision(format!("{:?}", revision)))
    }
}

/// File name for a downloaded tree of `revision`
pub fn download_name(revision: &str, extension: &str) -> String {
    format!("{}.{}", revision.replace('/', "_"), extension)
}

//! Version resolution against the remote repository

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::UpdateError;
use crate::marker::VersionMarker;
use crate::remote::archive::ArchiveRemote;
use crate::remote::fallback::FallbackRemote;
use crate::remote::git::{GitRemote, GitRemoteOptions};
use crate::remote::http::HttpClient;
use crate::remote::{CommitSummary, RemoteRepository};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Result of comparing the installed revision with the remote tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub local_revision: String,
    pub remote_revision: String,
    /// Newest first, truncated to the configured limit
    pub changelog: Vec<CommitSummary>,
    /// `None` when the installed revision is not on the tracked branch
    pub commits_behind: Option<usize>,
    pub checked_at: DateTime<Utc>,
}

impl VersionInfo {
    pub fn update_available(&self) -> bool {
        self.local_revision != self.remote_revision
    }
}

/// Reads the installed revision and queries the remote; never mutates the install tree
pub struct VersionSource {
    marker: VersionMarker,
    remote: Arc<dyn RemoteRepository>,
    network_timeout: Duration,
    fetch_timeout: Duration,
    changelog_limit: usize,
}

impl VersionSource {
    pub fn new(
        marker: VersionMarker,
        remote: Arc<dyn RemoteRepository>,
        network_timeout: Duration,
        fetch_timeout: Duration,
        changelog_limit: usize,
    ) -> Self {
        Self {
            marker,
            remote,
            network_timeout,
            fetch_timeout,
            changelog_limit,
        }
    }

    /// Wire the git remote, plus the HTTP API remote when configured
    pub fn from_settings(settings: &Settings, layout: &StorageLayout) -> Result<Self, UpdateError> {
        let repo = &settings.repository;
        let git: Arc<dyn RemoteRepository> = Arc::new(GitRemote::new(GitRemoteOptions {
            url: repo.url.clone(),
            branch: repo.branch.clone(),
            mirror_dir: layout.mirror_dir().path().to_path_buf(),
            downloads_dir: layout.downloads_dir().path().to_path_buf(),
            command_timeout: repo.fetch_timeout(),
        }));

        let secondary: Option<Arc<dyn RemoteRepository>> = match (&repo.api_base, &repo.slug) {
            (Some(api_base), Some(slug)) => {
                let http = HttpClient::new(api_base, repo.token.clone(), repo.fetch_timeout())?;
                Some(Arc::new(ArchiveRemote::new(
                    http,
                    slug,
                    &repo.branch,
                    layout.downloads_dir().path().to_path_buf(),
                    repo.fetch_timeout(),
                )))
            }
            _ => None,
        };

        let remote = FallbackRemote::new(git, secondary)
            .with_timeouts(repo.network_timeout(), repo.fetch_timeout());
        // Each backend gets the full per-attempt budget
        let backends = remote.backends();

        Ok(Self::new(
            VersionMarker::new(&settings.install_root, &settings.marker_file),
            Arc::new(remote),
            repo.network_timeout() * backends,
            repo.fetch_timeout() * backends,
            repo.changelog_limit,
        ))
    }

    pub fn marker(&self) -> &VersionMarker {
        &self.marker
    }

    /// Installed revision from the canonical marker
    pub async fn current_version(&self) -> Result<String, UpdateError> {
        self.marker.require().await
    }

    /// Compare the installed revision against the tip of the tracked branch
    pub async fn check_remote(&self) -> Result<VersionInfo, UpdateError> {
        let local = self.current_version().await?;
        let remote = bounded(
            self.network_timeout,
            "latest revision",
            self.remote.latest_revision(),
        )
        .await?;

        let (mut behind, on_branch) = if local == remote {
            (Vec::new(), true)
        } else {
            match bounded(
                self.network_timeout,
                "changelog",
                self.remote.commits_between(&local, &remote),
            )
            .await
            {
                Ok(commits) => (commits, true),
                Err(UpdateError::NotFound(msg)) | Err(UpdateError::InvalidRevision(msg)) => {
                    // Local build is not on the tracked branch; report recent history instead
                    warn!("{}; reporting recent history", msg);
                    let history = bounded(
                        self.network_timeout,
                        "history",
                        self.remote.history(self.changelog_limit),
                    )
                    .await?;
                    (history, false)
                }
                Err(e) => return Err(e),
            }
        };

        let commits_behind = on_branch.then_some(behind.len());
        behind.truncate(self.changelog_limit);
        match commits_behind {
            Some(n) => info!("Installed {} / remote {} ({} commits behind)", local, remote, n),
            None => info!("Installed {} / remote {} (off the tracked branch)", local, remote),
        }

        Ok(VersionInfo {
            local_revision: local,
            remote_revision: remote,
            changelog: behind,
            commits_behind,
            checked_at: Utc::now(),
        })
    }

    /// Newest-first history of the tracked branch
    pub async fn fetch_history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError> {
        bounded(self.network_timeout, "history", self.remote.history(limit)).await
    }

    /// Newest revision of the tracked branch
    pub async fn latest_revision(&self) -> Result<String, UpdateError> {
        bounded(
            self.network_timeout,
            "latest revision",
            self.remote.latest_revision(),
        )
        .await
    }

    /// Write the full tree of `revision` into `staging`
    pub async fn materialize(&self, revision: &str, staging: &Path) -> Result<(), UpdateError> {
        info!("Materializing {} into {}", revision, staging.display());
        bounded(
            self.fetch_timeout,
            "materialize",
            self.remote.materialize(revision, staging),
        )
        .await
    }
}

async fn bounded<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, UpdateError>>,
) -> Result<T, UpdateError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(UpdateError::RemoteUnavailable(format!(
            "{} timed out after {:?}",
            what, limit
        ))),
    }
}

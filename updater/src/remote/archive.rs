//! Hosting API backed remote
//!
//! Secondary retrieval path used when the git transport is unavailable:
//! revision metadata comes from the REST API and trees from tarball
//! downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use remote_api::{CommitResponse, CompareResponse};
use tracing::info;

use crate::errors::UpdateError;
use crate::filesys::file::File;
use crate::remote::git::extract_tar;
use crate::remote::http::HttpClient;
use crate::remote::{download_name, validate_revision, CommitSummary, RemoteRepository};

/// Remote accessed through the hosting HTTP API
pub struct ArchiveRemote {
    http: HttpClient,
    slug: String,
    branch: String,
    downloads_dir: PathBuf,
    extract_timeout: Duration,
}

impl ArchiveRemote {
    pub fn new(
        http: HttpClient,
        slug: &str,
        branch: &str,
        downloads_dir: PathBuf,
        extract_timeout: Duration,
    ) -> Self {
        Self {
            http,
            slug: slug.trim_matches('/').to_string(),
            branch: branch.to_string(),
            downloads_dir,
            extract_timeout,
        }
    }

    fn repo_path(&self, rest: &str) -> String {
        format!("/repos/{}/{}", self.slug, rest)
    }
}

impl From<CommitResponse> for CommitSummary {
    fn from(commit: CommitResponse) -> Self {
        CommitSummary {
            message: commit.subject().to_string(),
            timestamp: commit.timestamp(),
            id: commit.sha,
        }
    }
}

#[async_trait]
impl RemoteRepository for ArchiveRemote {
    fn name(&self) -> &str {
        "http-api"
    }

    async fn latest_revision(&self) -> Result<String, UpdateError> {
        let commit: CommitResponse = self
            .http
            .get_json(&self.repo_path(&format!("commits/{}", self.branch)))
            .await?;
        Ok(commit.sha)
    }

    async fn commits_between(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, UpdateError> {
        let compare: CompareResponse = self
            .http
            .get_json(&self.repo_path(&format!("compare/{}...{}", base, head)))
            .await?;
        // Upstream lists oldest first
        Ok(compare.commits.into_iter().rev().map(Into::into).collect())
    }

    async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError> {
        let commits: Vec<CommitResponse> = self
            .http
            .get_json(&self.repo_path(&format!(
                "commits?sha={}&per_page={}",
                self.branch,
                limit.clamp(1, 100)
            )))
            .await?;
        Ok(commits.into_iter().take(limit).map(Into::into).collect())
    }

    async fn materialize(&self, revision: &str, dest: &Path) -> Result<(), UpdateError> {
        validate_revision(revision)?;
        info!("Downloading tarball for {} from {}", revision, self.http.base_url());
        let bytes = self
            .http
            .get_bytes(&self.repo_path(&format!("tarball/{}", revision)))
            .await?;

        let tarball = File::new(self.downloads_dir.join(download_name(revision, "tar.gz")));
        tarball.write_bytes(&bytes).await?;
        let result = extract_tar(tarball.path(), dest, true, self.extract_timeout).await;
        let _ = tarball.delete().await;
        result
    }
}

//! Git CLI backed remote
//!
//! Keeps a bare mirror of the tracked branch in the updater's data dir. The
//! mirror is updater state; the install tree is never a git checkout target.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::UpdateError;
use crate::process::{self, CommandOutput};
use crate::remote::{download_name, validate_revision, CommitSummary, RemoteRepository};

const LOG_FORMAT: &str = "--format=%H%x1f%cI%x1f%s";

/// Git remote options
#[derive(Debug, Clone)]
pub struct GitRemoteOptions {
    pub url: String,
    pub branch: String,
    pub mirror_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub command_timeout: Duration,
}

/// Remote accessed through the `git` binary
pub struct GitRemote {
    options: GitRemoteOptions,
    // Serializes mirror fetches; concurrent `git fetch` on one repo races on refs
    mirror_lock: Mutex<()>,
}

impl GitRemote {
    pub fn new(options: GitRemoteOptions) -> Self {
        Self {
            options,
            mirror_lock: Mutex::new(()),
        }
    }

    fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.options.branch)
    }

    async fn git(&self, args: &[&str]) -> Result<CommandOutput, UpdateError> {
        let git_dir = format!("--git-dir={}", self.options.mirror_dir.display());
        let mut full: Vec<&str> = vec![&git_dir];
        full.extend_from_slice(args);
        process::run("git", &full, None, self.options.command_timeout)
            .await
            .map_err(|e| UpdateError::RemoteUnavailable(e.to_string()))
    }

    /// Clone the mirror on first use, then fetch the tracked branch
    async fn sync_mirror(&self) -> Result<(), UpdateError> {
        let _guard = self.mirror_lock.lock().await;
        let mirror = &self.options.mirror_dir;

        if !mirror.join("HEAD").exists() {
            info!("Creating git mirror of {} at {}", self.options.url, mirror.display());
            if let Some(parent) = mirror.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let target = mirror.display().to_string();
            let output = process::run(
                "git",
                &[
                    "clone",
                    "--bare",
                    "--single-branch",
                    "--branch",
                    &self.options.branch,
                    &self.options.url,
                    &target,
                ],
                None,
                self.options.command_timeout,
            )
            .await
            .map_err(|e| UpdateError::RemoteUnavailable(e.to_string()))?;
            if !output.success {
                return Err(UpdateError::RemoteUnavailable(format!(
                    "git clone {} failed: {}",
                    self.options.url,
                    output.describe()
                )));
            }
            return Ok(());
        }

        debug!("Fetching {} into mirror", self.options.branch);
        let refspec = format!("+{}:{}", self.branch_ref(), self.branch_ref());
        let output = self
            .git(&["fetch", "--prune", &self.options.url, &refspec])
            .await?;
        if !output.success {
            return Err(UpdateError::RemoteUnavailable(format!(
                "git fetch failed: {}",
                output.describe()
            )));
        }
        Ok(())
    }

    async fn has_commit(&self, revision: &str) -> Result<bool, UpdateError> {
        let spec = format!("{}^{{commit}}", revision);
        Ok(self.git(&["cat-file", "-e", &spec]).await?.success)
    }

    async fn log(&self, args: &[&str]) -> Result<Vec<CommitSummary>, UpdateError> {
        let mut full = vec!["log", LOG_FORMAT];
        full.extend_from_slice(args);
        let output = self.git(&full).await?;
        if !output.success {
            return Err(UpdateError::RemoteUnavailable(format!(
                "git log failed: {}",
                output.describe()
            )));
        }
        Ok(parse_log(&output.stdout))
    }
}

#[async_trait]
impl RemoteRepository for GitRemote {
    fn name(&self) -> &str {
        "git"
    }

    async fn latest_revision(&self) -> Result<String, UpdateError> {
        let output = process::run(
            "git",
            &["ls-remote", &self.options.url, &self.branch_ref()],
            None,
            self.options.command_timeout,
        )
        .await
        .map_err(|e| UpdateError::RemoteUnavailable(e.to_string()))?;

        if !output.success {
            return Err(UpdateError::RemoteUnavailable(format!(
                "git ls-remote failed: {}",
                output.describe()
            )));
        }

        output
            .stdout
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| {
                UpdateError::RemoteUnavailable(format!(
                    "Branch {} not found on {}",
                    self.options.branch, self.options.url
                ))
            })
    }

    async fn commits_between(
        &self,
        base: &str,
        head: &str,
    ) -> Result<Vec<CommitSummary>, UpdateError> {
        validate_revision(base)?;
        validate_revision(head)?;
        self.sync_mirror().await?;
        if !self.has_commit(base).await? {
            return Err(UpdateError::NotFound(format!(
                "Revision {} is not part of the remote history",
                base
            )));
        }
        let range = format!("{}..{}", base, head);
        self.log(&[&range]).await
    }

    async fn history(&self, limit: usize) -> Result<Vec<CommitSummary>, UpdateError> {
        self.sync_mirror().await?;
        let max = format!("--max-count={}", limit);
        let branch = self.branch_ref();
        self.log(&[&max, &branch]).await
    }

    async fn materialize(&self, revision: &str, dest: &Path) -> Result<(), UpdateError> {
        validate_revision(revision)?;
        if !self.has_commit(revision).await.unwrap_or(false) {
            self.sync_mirror().await?;
        }

        tokio::fs::create_dir_all(&self.options.downloads_dir).await?;
        let tarball = self
            .options
            .downloads_dir
            .join(download_name(revision, "tar"));
        let tarball_arg = tarball.display().to_string();

        let output = self
            .git(&["archive", "--format=tar", "-o", &tarball_arg, revision])
            .await?;
        if !output.success {
            return Err(UpdateError::RemoteUnavailable(format!(
                "git archive {} failed: {}",
                revision,
                output.describe()
            )));
        }

        let result = extract_tar(&tarball, dest, false, self.options.command_timeout).await;
        let _ = tokio::fs::remove_file(&tarball).await;
        result
    }
}

/// Extract a tarball into `dest`
pub async fn extract_tar(
    tarball: &Path,
    dest: &Path,
    gzip_with_top_dir: bool,
    timeout: Duration,
) -> Result<(), UpdateError> {
    tokio::fs::create_dir_all(dest).await?;
    let file = tarball.display().to_string();
    let target = dest.display().to_string();
    let mode = if gzip_with_top_dir { "-xzf" } else { "-xf" };
    let mut args: Vec<&str> = vec![mode, file.as_str(), "-C", target.as_str()];
    if gzip_with_top_dir {
        args.push("--strip-components=1");
    }
    let output = process::run("tar", &args, None, timeout).await?;
    if !output.success {
        return Err(UpdateError::RemoteUnavailable(format!(
            "Failed to extract {}: {}",
            tarball.display(),
            output.describe()
        )));
    }
    Ok(())
}

/// Parse `git log` output produced with [`LOG_FORMAT`]
pub fn parse_log(stdout: &str) -> Vec<CommitSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\x1f');
            let id = fields.next()?.trim();
            let date = fields.next()?;
            let message = fields.next().unwrap_or("").trim();
            if id.is_empty() {
                return None;
            }
            Some(CommitSummary {
                id: id.to_string(),
                message: message.to_string(),
                timestamp: DateTime::parse_from_rfc3339(date.trim())
                    .ok()
                    .map(|d| d.with_timezone(&Utc)),
            })
        })
        .collect()
}

//! API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commit as returned by `/repos/{owner}/{repo}/commits/{ref}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub sha: String,
    pub commit: CommitDetail,
}

/// Commit payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: Option<CommitSignature>,
    pub committer: Option<CommitSignature>,
}

/// Author or committer signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSignature {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl CommitResponse {
    /// First line of the commit message
    pub fn subject(&self) -> &str {
        self.commit.message.lines().next().unwrap_or("").trim()
    }

    /// Committer date, falling back to the author date
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.commit
            .committer
            .as_ref()
            .and_then(|c| c.date)
            .or_else(|| self.commit.author.as_ref().and_then(|a| a.date))
    }
}

/// Response of `/repos/{owner}/{repo}/compare/{base}...{head}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    pub status: String,
    pub ahead_by: u64,
    pub behind_by: u64,
    pub total_commits: u64,
    /// Oldest first, as returned upstream
    #[serde(default)]
    pub commits: Vec<CommitResponse>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub documentation_url: Option<String>,
}

//! Backup record persisted as `record.json`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one live file at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// False when the path was absent; restore removes it
    pub existed: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ManifestEntry {
    pub fn absent() -> Self {
        Self {
            existed: false,
            size: 0,
            sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Revision installed when the snapshot was taken
    pub source_revision: String,
    /// Relative path -> snapshot state
    pub manifest: BTreeMap<String, ManifestEntry>,
    /// 0 for the most recent backup; recomputed on every listing
    #[serde(default)]
    pub retention_rank: usize,
}

impl BackupRecord {
    pub fn total_bytes(&self) -> u64 {
        self.manifest.values().map(|e| e.size).sum()
    }

    pub fn files_saved(&self) -> usize {
        self.manifest.values().filter(|e| e.existed).count()
    }
}

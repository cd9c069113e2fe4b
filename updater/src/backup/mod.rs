//! Pre-update snapshots of the files an update is about to touch
//!
//! Each backup lives in its own directory under the updater's data dir:
//!
//! ```text
//! backups/<id>/record.json
//! backups/<id>/files/<relative path>
//! ```
//!
//! A directory without `record.json` is an incomplete snapshot and is ignored.

pub mod record;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::Utc;
use sysinfo::Disks;
use tracing::{debug, error, info, warn};

use crate::detect::DeploymentDescriptor;
use crate::errors::UpdateError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::utils::short_revision;

pub use record::{BackupRecord, ManifestEntry};

const RECORD_FILE: &str = "record.json";
const FILES_DIR: &str = "files";

pub struct BackupArchive {
    dir: Dir,
    marker_name: String,
    min_free_bytes: u64,
}

impl BackupArchive {
    pub fn new(dir: Dir, marker_name: &str, min_free_bytes: u64) -> Self {
        Self {
            dir,
            marker_name: marker_name.to_string(),
            min_free_bytes,
        }
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    /// Snapshot `paths` (relative to the install root) plus the version marker
    pub async fn create(
        &self,
        descriptor: &DeploymentDescriptor,
        source_revision: &str,
        paths: &BTreeSet<String>,
    ) -> Result<BackupRecord, UpdateError> {
        self.dir.create().await.map_err(backup_failed)?;

        let mut wanted = paths.clone();
        wanted.insert(self.marker_name.clone());

        let mut manifest = BTreeMap::new();
        let mut required = 0u64;
        for rel in &wanted {
            let live = descriptor.install_root.join(rel);
            match tokio::fs::symlink_metadata(&live).await {
                Ok(meta) if meta.is_dir() => {
                    return Err(UpdateError::BackupFailed(format!(
                        "{} is a directory in the live tree",
                        rel
                    )));
                }
                Ok(meta) => {
                    required += meta.len();
                    manifest.insert(
                        rel.clone(),
                        ManifestEntry {
                            existed: true,
                            size: meta.len(),
                            sha256: None,
                        },
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    manifest.insert(rel.clone(), ManifestEntry::absent());
                }
                Err(e) => return Err(backup_failed(e.into())),
            }
        }

        self.ensure_free_space(required)?;

        let id = self.next_id(source_revision).await;
        let backup_dir = self.dir.subdir(&id);
        info!(
            "Creating backup {} ({} paths, {} bytes)",
            id,
            manifest.len(),
            required
        );

        let record = match self
            .write_snapshot(&backup_dir, &id, descriptor, source_revision, manifest)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!("Backup {} failed, removing partial snapshot: {}", id, e);
                if let Err(cleanup) = backup_dir.delete().await {
                    warn!("Failed to remove partial backup {}: {}", id, cleanup);
                }
                return Err(backup_failed(e));
            }
        };

        info!("Backup {} created ({} files saved)", id, record.files_saved());
        Ok(record)
    }

    async fn write_snapshot(
        &self,
        backup_dir: &Dir,
        id: &str,
        descriptor: &DeploymentDescriptor,
        source_revision: &str,
        mut manifest: BTreeMap<String, ManifestEntry>,
    ) -> Result<BackupRecord, UpdateError> {
        let files = backup_dir.subdir(FILES_DIR);
        files.create().await?;

        for (rel, entry) in manifest.iter_mut().filter(|(_, e)| e.existed) {
            let live = descriptor.install_root.join(rel);
            let saved = File::new(files.path().join(rel));
            saved.replace_from(&live).await?;
            entry.sha256 = Some(saved.sha256().await?);
        }

        let record = BackupRecord {
            id: id.to_string(),
            created_at: Utc::now(),
            source_revision: source_revision.to_string(),
            manifest,
            retention_rank: 0,
        };
        // Written last: its presence marks the snapshot complete
        backup_dir.file(RECORD_FILE).write_json(&record).await?;
        Ok(record)
    }

    /// Put every manifest path back to its snapshot state. Safe to repeat.
    pub async fn restore(
        &self,
        id: &str,
        descriptor: &DeploymentDescriptor,
    ) -> Result<BackupRecord, UpdateError> {
        let record = self.get(id).await?;
        let files = self.dir.subdir(id).subdir(FILES_DIR);
        info!(
            "Restoring backup {} (revision {}) into {}",
            id,
            record.source_revision,
            descriptor.install_root.display()
        );

        for (rel, entry) in &record.manifest {
            let live = File::new(descriptor.install_root.join(rel));
            if entry.existed {
                let saved = files.file(rel);
                if let Some(expected) = &entry.sha256 {
                    let actual = saved.sha256().await.map_err(rollback_failed)?;
                    if &actual != expected {
                        return Err(UpdateError::RollbackFailed(format!(
                            "Backup copy of {} is corrupt (sha256 {} != {})",
                            rel, actual, expected
                        )));
                    }
                }
                live.replace_from(saved.path())
                    .await
                    .map_err(rollback_failed)?;
            } else {
                debug!("Removing {} (absent at snapshot time)", rel);
                live.delete().await.map_err(rollback_failed)?;
                remove_empty_parents(&descriptor.install_root, live.path()).await;
            }
        }

        info!("Backup {} restored", id);
        Ok(record)
    }

    /// All complete backups, most recent first
    pub async fn list(&self) -> Result<Vec<BackupRecord>, UpdateError> {
        if !self.dir.exists().await {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for path in self.dir.list_dirs().await? {
            let file = File::new(path.join(RECORD_FILE));
            if !file.exists().await {
                debug!("Ignoring incomplete backup {}", path.display());
                continue;
            }
            match file.read_json::<BackupRecord>().await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Unreadable backup record {}: {}", file.path().display(), e),
            }
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        for (rank, record) in records.iter_mut().enumerate() {
            record.retention_rank = rank;
        }
        Ok(records)
    }

    pub async fn latest(&self) -> Result<Option<BackupRecord>, UpdateError> {
        Ok(self.list().await?.into_iter().next())
    }

    pub async fn get(&self, id: &str) -> Result<BackupRecord, UpdateError> {
        if id.is_empty() || id.contains('/') || id.starts_with('.') {
            return Err(UpdateError::NotFound(format!("Backup {:?}", id)));
        }
        let file = self.dir.subdir(id).file(RECORD_FILE);
        if !file.exists().await {
            return Err(UpdateError::NotFound(format!("Backup {}", id)));
        }
        file.read_json().await
    }

    /// Delete the oldest backups beyond `keep`; returns the removed ids
    pub async fn prune(&self, keep: usize) -> Result<Vec<String>, UpdateError> {
        let mut removed = Vec::new();
        for record in self.list().await?.into_iter().skip(keep) {
            info!("Pruning backup {}", record.id);
            self.dir.subdir(&record.id).delete().await?;
            removed.push(record.id);
        }
        Ok(removed)
    }

    async fn next_id(&self, source_revision: &str) -> String {
        let revision: String = short_revision(source_revision)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let base = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), revision);

        let mut id = base.clone();
        let mut n = 1;
        while self.dir.subdir(&id).exists().await {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        id
    }

    fn ensure_free_space(&self, required: u64) -> Result<(), UpdateError> {
        let Some(available) = available_space(self.dir.path()) else {
            debug!("No disk found for {}, skipping space check", self.dir.path().display());
            return Ok(());
        };
        let needed = required.saturating_add(self.min_free_bytes);
        if available < needed {
            return Err(UpdateError::BackupFailed(format!(
                "Not enough free space in {}: {} bytes available, {} needed",
                self.dir.path().display(),
                available,
                needed
            )));
        }
        Ok(())
    }
}

/// Free bytes on the disk holding `path` (longest matching mount point)
fn available_space(path: &Path) -> Option<u64> {
    let path = std::fs::canonicalize(path).ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

// Drops directories the update created, stopping at the first non-empty one
async fn remove_empty_parents(root: &Path, file: &Path) {
    let mut current = file.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if tokio::fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}

fn backup_failed(e: UpdateError) -> UpdateError {
    match e {
        UpdateError::BackupFailed(_) => e,
        other => UpdateError::BackupFailed(other.to_string()),
    }
}

fn rollback_failed(e: UpdateError) -> UpdateError {
    match e {
        UpdateError::RollbackFailed(_) => e,
        other => UpdateError::RollbackFailed(other.to_string()),
    }
}

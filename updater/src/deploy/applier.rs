//! In-place file replacement of the live tree
//!
//! The live install root is only ever modified one file at a time: an
//! existing file is removed and the staged copy written in its place. No
//! directory inside the install root is removed recursively.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::detect::DeploymentDescriptor;
use crate::errors::UpdateError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::marker::VersionMarker;

/// Result of one apply pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub success: bool,
    /// Every path touched, including on failure
    pub files_changed: Vec<String>,
    pub error: Option<String>,
}

pub struct UpdateApplier {
    excluded: Vec<String>,
    marker_name: String,
}

impl UpdateApplier {
    pub fn new(excluded_paths: &[String], marker_name: &str) -> Self {
        let mut excluded: Vec<String> = excluded_paths.to_vec();
        if !excluded.iter().any(|p| p == ".git") {
            excluded.push(".git".to_string());
        }
        excluded.push(marker_name.to_string());
        Self {
            excluded,
            marker_name: marker_name.to_string(),
        }
    }

    /// Relative paths the staged tree would write into the live tree
    pub fn plan(&self, staged: &Dir) -> Result<BTreeSet<String>, UpdateError> {
        staged.walk_files(&self.excluded)
    }

    /// Copy the staged tree over the live tree and stamp the marker with `revision`
    pub async fn apply(
        &self,
        staged: &Dir,
        descriptor: &DeploymentDescriptor,
        revision: &str,
    ) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        let plan = match self.plan(staged) {
            Ok(plan) => plan,
            Err(e) => {
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        info!(
            "Applying {} files into {}",
            plan.len(),
            descriptor.install_root.display()
        );

        for rel in &plan {
            let live = File::new(descriptor.install_root.join(rel));
            // Recorded before the write so a half-written file is still listed
            outcome.files_changed.push(rel.clone());
            if let Err(e) = live.replace_from(&staged.path().join(rel)).await {
                error!("Failed to replace {}: {}", rel, e);
                outcome.error = Some(format!("{}: {}", rel, e));
                return outcome;
            }
            debug!("Replaced {}", rel);
        }

        let marker = VersionMarker::new(&descriptor.install_root, &self.marker_name);
        outcome.files_changed.push(self.marker_name.clone());
        if let Err(e) = marker.write(revision).await {
            outcome.error = Some(format!("{}: {}", self.marker_name, e));
            return outcome;
        }

        outcome.success = true;
        info!("Applied {} ({} files)", revision, plan.len());
        outcome
    }
}

impl ApplyOutcome {
    pub fn into_result(self) -> Result<Self, UpdateError> {
        if self.success {
            Ok(self)
        } else {
            Err(UpdateError::ApplyFailed(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

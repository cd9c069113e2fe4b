//! Pre-flight compatibility gate
//!
//! Compares the staged candidate's declared requirements with what is
//! installed on this machine before anything destructive happens.

pub mod inventory;
pub mod requirement;
pub mod version;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::UpdateError;
use crate::filesys::file::File;

pub use inventory::{CommandInventory, PackageInventory, StaticInventory};
pub use requirement::{normalize_name, Requirement, Specifier};
pub use version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    ThirdParty,
    Internal,
}

/// One checked dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityEntry {
    pub dependency_name: String,
    pub required: String,
    pub installed: Option<String>,
    pub satisfied: bool,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub entries: Vec<CompatibilityEntry>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        self.entries.iter().all(|e| e.satisfied)
    }

    pub fn unsatisfied(&self) -> impl Iterator<Item = &CompatibilityEntry> {
        self.entries.iter().filter(|e| !e.satisfied)
    }

    /// One line listing every unsatisfied entry
    pub fn summary(&self) -> String {
        let failures: Vec<String> = self
            .unsatisfied()
            .map(|e| match &e.installed {
                Some(installed) => format!(
                    "{} requires {} (installed {})",
                    e.dependency_name, e.required, installed
                ),
                None if e.kind == DependencyKind::Internal => {
                    format!("internal module {} missing", e.dependency_name)
                }
                None => format!("{} requires {} (not installed)", e.dependency_name, e.required),
            })
            .collect();
        if failures.is_empty() {
            "all dependencies satisfied".to_string()
        } else {
            failures.join("; ")
        }
    }

    /// `CompatibilityFailed` when any entry is unsatisfied
    pub fn into_result(self) -> Result<Self, UpdateError> {
        if self.is_compatible() {
            Ok(self)
        } else {
            Err(UpdateError::CompatibilityFailed(self.summary()))
        }
    }
}

pub struct CompatibilityChecker {
    requirements_file: String,
    internal_modules: Vec<String>,
    inventory: Box<dyn PackageInventory>,
}

impl CompatibilityChecker {
    pub fn new(
        requirements_file: &str,
        internal_modules: Vec<String>,
        inventory: Box<dyn PackageInventory>,
    ) -> Self {
        Self {
            requirements_file: requirements_file.to_string(),
            internal_modules,
            inventory,
        }
    }

    /// Check a staged candidate tree
    pub async fn check(&self, candidate: &Path) -> Result<CompatibilityReport, UpdateError> {
        let mut entries = Vec::new();

        let requirements = File::new(candidate.join(&self.requirements_file));
        if requirements.exists().await {
            let parsed = requirement::parse_requirements(&requirements.read_string().await?);
            debug!("Candidate declares {} requirements", parsed.len());
            if !parsed.is_empty() {
                let installed = self.inventory.installed().await?;
                for req in parsed {
                    let version = installed.get(&req.name).cloned();
                    let satisfied = version.as_deref().is_some_and(|v| req.matches(v));
                    entries.push(CompatibilityEntry {
                        required: req.spec_string(),
                        dependency_name: req.name,
                        installed: version,
                        satisfied,
                        kind: DependencyKind::ThirdParty,
                    });
                }
            }
        } else {
            warn!(
                "Candidate has no {}; skipping third-party checks",
                self.requirements_file
            );
        }

        for module in &self.internal_modules {
            let present = tokio::fs::metadata(candidate.join(module)).await.is_ok();
            entries.push(CompatibilityEntry {
                dependency_name: module.clone(),
                required: "present".to_string(),
                installed: present.then(|| "present".to_string()),
                satisfied: present,
                kind: DependencyKind::Internal,
            });
        }

        let report = CompatibilityReport { entries };
        info!("Compatibility: {}", report.summary());
        Ok(report)
    }
}

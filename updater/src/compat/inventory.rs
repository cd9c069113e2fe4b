//! Installed package inventory

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::compat::requirement::normalize_name;
use crate::errors::UpdateError;
use crate::process;

/// Source of installed package versions, keyed by normalized name
#[async_trait]
pub trait PackageInventory: Send + Sync {
    async fn installed(&self) -> Result<HashMap<String, String>, UpdateError>;
}

/// Runs a command printing `name==version` lines
pub struct CommandInventory {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandInventory {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl PackageInventory for CommandInventory {
    async fn installed(&self) -> Result<HashMap<String, String>, UpdateError> {
        let (program, args) = self.command.split_first().ok_or_else(|| {
            UpdateError::ConfigError("compatibility.inventory_command is empty".to_string())
        })?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = process::run(program, &args, None, self.timeout)
            .await
            .map_err(|e| {
                UpdateError::CompatibilityFailed(format!("Package inventory unavailable: {}", e))
            })?;
        if !output.success {
            return Err(UpdateError::CompatibilityFailed(format!(
                "Package inventory command failed: {}",
                output.describe()
            )));
        }

        let packages = parse_freeze(&output.stdout);
        debug!("Inventory lists {} installed packages", packages.len());
        Ok(packages)
    }
}

/// Parse `name==version` lines, ignoring anything else
pub fn parse_freeze(stdout: &str) -> HashMap<String, String> {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, version) = line.trim().split_once("==")?;
            Some((normalize_name(name), version.trim().to_string()))
        })
        .collect()
}

/// Fixed inventory
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    packages: HashMap<String, String>,
}

impl StaticInventory {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            packages: pairs
                .iter()
                .map(|(name, version)| (normalize_name(name), version.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl PackageInventory for StaticInventory {
    async fn installed(&self) -> Result<HashMap<String, String>, UpdateError> {
        Ok(self.packages.clone())
    }
}

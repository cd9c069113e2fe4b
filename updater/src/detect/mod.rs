//! Runtime environment detection
//!
//! The update strategy (how the hosted service is stopped and started, and
//! which filesystem operations are permission-safe) depends on where the
//! installation runs. Detection only reads marker files below a filesystem
//! root, so tests point it at a fixture directory.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runtime environment classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    /// Unprivileged LXC container
    ContainerLxc,
    /// Docker, podman or another OCI runtime
    ContainerDocker,
    /// Host managed by a systemd unit
    SystemdHost,
    /// Anything else; restarts are left to the operator
    Development,
}

impl DeploymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentKind::ContainerLxc => "container_lxc",
            DeploymentKind::ContainerDocker => "container_docker",
            DeploymentKind::SystemdHost => "systemd_host",
            DeploymentKind::Development => "development",
        }
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the hosted service is addressed for stop/start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ServiceHandle {
    SystemdUnit(String),
    Container(String),
    Process(String),
    Unmanaged,
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceHandle::SystemdUnit(unit) => write!(f, "systemd:{}", unit),
            ServiceHandle::Container(name) => write!(f, "container:{}", name),
            ServiceHandle::Process(command) => write!(f, "process:{}", command),
            ServiceHandle::Unmanaged => f.write_str("unmanaged"),
        }
    }
}

/// Immutable description of the runtime, computed once per process start
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentDescriptor {
    pub kind: DeploymentKind,
    pub install_root: PathBuf,
    pub service_handle: ServiceHandle,
    pub writable_permissions: bool,
}

/// Inputs for detection
#[derive(Debug, Clone)]
pub struct Detector {
    /// Filesystem root to inspect (`/` outside tests)
    pub fs_root: PathBuf,
    /// Root of the managed installation
    pub install_root: PathBuf,
    /// Supervisor unit name, without the `.service` suffix
    pub service_name: String,
    /// Explicit container name, otherwise the hostname is used
    pub container_name: Option<String>,
    /// Command for direct process control inside LXC without a unit
    pub start_command: Option<String>,
}

const UNIT_DIRS: &[&str] = &[
    "etc/systemd/system",
    "lib/systemd/system",
    "usr/lib/systemd/system",
];

const CGROUP_RUNTIME_MARKERS: &[&str] = &["docker", "containerd", "kubepods", "libpod"];

impl Detector {
    /// Classify the runtime, most specific marker first
    pub fn detect(&self) -> DeploymentDescriptor {
        let unit = self.find_unit();
        let writable_permissions = is_writable(&self.install_root);

        let (kind, service_handle) = if self.is_lxc() {
            let handle = match (&unit, &self.start_command) {
                (Some(unit), _) => ServiceHandle::SystemdUnit(unit.clone()),
                (None, Some(command)) => ServiceHandle::Process(command.clone()),
                (None, None) => ServiceHandle::Unmanaged,
            };
            (DeploymentKind::ContainerLxc, handle)
        } else if self.is_oci_container() {
            let name = self
                .container_name
                .clone()
                .or_else(|| self.hostname())
                .map(ServiceHandle::Container)
                .unwrap_or(ServiceHandle::Unmanaged);
            (DeploymentKind::ContainerDocker, name)
        } else if let Some(unit) = unit {
            (DeploymentKind::SystemdHost, ServiceHandle::SystemdUnit(unit))
        } else {
            (DeploymentKind::Development, ServiceHandle::Unmanaged)
        };

        debug!(
            "Detected deployment {} (handle {}, writable {})",
            kind, service_handle, writable_permissions
        );

        DeploymentDescriptor {
            kind,
            install_root: self.install_root.clone(),
            service_handle,
            writable_permissions,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.fs_root.join(rel)
    }

    fn read(&self, rel: &str) -> Option<String> {
        fs::read(self.path(rel))
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn container_hint(&self) -> Option<String> {
        self.read("run/systemd/container")
            .map(|s| s.trim().to_lowercase())
    }

    fn is_lxc(&self) -> bool {
        if let Some(environ) = self.read("proc/1/environ") {
            if environ
                .split(['\0', '\n'])
                .any(|var| var == "container=lxc" || var == "container=lxc-libvirt")
            {
                return true;
            }
        }
        if self.container_hint().as_deref() == Some("lxc") {
            return true;
        }
        if self.path("dev/.lxc").exists() {
            return true;
        }
        self.read("proc/self/uid_map")
            .map(|map| is_shifted_uid_map(&map))
            .unwrap_or(false)
    }

    fn is_oci_container(&self) -> bool {
        if self.path(".dockerenv").exists() || self.path("run/.containerenv").exists() {
            return true;
        }
        if matches!(self.container_hint().as_deref(), Some("docker") | Some("podman")) {
            return true;
        }
        self.read("proc/1/cgroup")
            .map(|cgroup| CGROUP_RUNTIME_MARKERS.iter().any(|m| cgroup.contains(m)))
            .unwrap_or(false)
    }

    fn find_unit(&self) -> Option<String> {
        let file_name = format!("{}.service", self.service_name);
        UNIT_DIRS
            .iter()
            .any(|dir| self.path(dir).join(&file_name).is_file())
            .then(|| self.service_name.clone())
    }

    fn hostname(&self) -> Option<String> {
        self.read("etc/hostname")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// An unprivileged container maps uid 0 onto a non-zero host uid
fn is_shifted_uid_map(map: &str) -> bool {
    map.lines().any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        matches!(fields.as_slice(), [inside, outside, _] if *inside == "0" && *outside != "0")
    })
}

fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

//! Deployment detection tests

use std::path::Path;

use tempfile::TempDir;
use vox_updater::detect::{DeploymentKind, Detector, ServiceHandle};

fn detector(root: &Path) -> Detector {
    Detector {
        fs_root: root.to_path_buf(),
        install_root: root.join("opt/vox"),
        service_name: "vox".to_string(),
        container_name: None,
        start_command: None,
    }
}

fn fixture(files: &[(&str, &str)]) -> TempDir {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("opt/vox")).unwrap();
    for (rel, contents) in files {
        let path = root.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
    root
}

#[test]
fn test_unit_file_without_container_markers_is_systemd_host() {
    let root = fixture(&[("etc/systemd/system/vox.service", "[Service]\n")]);
    let descriptor = detector(root.path()).detect();

    assert_eq!(descriptor.kind, DeploymentKind::SystemdHost);
    assert_eq!(
        descriptor.service_handle,
        ServiceHandle::SystemdUnit("vox".to_string())
    );
    assert!(descriptor.writable_permissions);
}

#[test]
fn test_empty_root_is_development() {
    let root = fixture(&[]);
    let descriptor = detector(root.path()).detect();
    assert_eq!(descriptor.kind, DeploymentKind::Development);
    assert_eq!(descriptor.service_handle, ServiceHandle::Unmanaged);
}

#[test]
fn test_lxc_marker_wins_over_unit_file() {
    let root = fixture(&[
        ("proc/1/environ", "PATH=/usr/bin\0container=lxc\0"),
        ("lib/systemd/system/vox.service", "[Service]\n"),
    ]);
    let descriptor = detector(root.path()).detect();
    assert_eq!(descriptor.kind, DeploymentKind::ContainerLxc);
    assert_eq!(
        descriptor.service_handle,
        ServiceHandle::SystemdUnit("vox".to_string())
    );
}

#[test]
fn test_lxc_without_unit_uses_start_command() {
    let root = fixture(&[("run/systemd/container", "lxc\n")]);
    let mut detector = detector(root.path());
    detector.start_command = Some("python3 -m vox.server".to_string());

    let descriptor = detector.detect();
    assert_eq!(descriptor.kind, DeploymentKind::ContainerLxc);
    assert_eq!(
        descriptor.service_handle,
        ServiceHandle::Process("python3 -m vox.server".to_string())
    );
}

#[test]
fn test_shifted_uid_map_is_lxc() {
    let root = fixture(&[("proc/self/uid_map", "         0     100000      65536\n")]);
    assert_eq!(detector(root.path()).detect().kind, DeploymentKind::ContainerLxc);
}

#[test]
fn test_dockerenv_uses_hostname_as_container() {
    let root = fixture(&[(".dockerenv", ""), ("etc/hostname", "vox-stt\n")]);
    let descriptor = detector(root.path()).detect();
    assert_eq!(descriptor.kind, DeploymentKind::ContainerDocker);
    assert_eq!(
        descriptor.service_handle,
        ServiceHandle::Container("vox-stt".to_string())
    );
}

#[test]
fn test_cgroup_runtime_marker_with_explicit_container_name() {
    let root = fixture(&[("proc/1/cgroup", "0::/system.slice/docker-3f2a.scope\n")]);
    let mut detector = detector(root.path());
    detector.container_name = Some("vox".to_string());

    let descriptor = detector.detect();
    assert_eq!(descriptor.kind, DeploymentKind::ContainerDocker);
    assert_eq!(
        descriptor.service_handle,
        ServiceHandle::Container("vox".to_string())
    );
}

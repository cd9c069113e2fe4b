//! Backup archive tests

use std::collections::BTreeSet;
use std::path::Path;

use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use vox_updater::backup::BackupArchive;
use vox_updater::detect::{DeploymentDescriptor, DeploymentKind, ServiceHandle};
use vox_updater::errors::UpdateError;
use vox_updater::filesys::dir::Dir;

use crate::fixtures::{read_tree, tree, write_tree};

fn descriptor(root: &Path) -> DeploymentDescriptor {
    DeploymentDescriptor {
        kind: DeploymentKind::Development,
        install_root: root.to_path_buf(),
        service_handle: ServiceHandle::Unmanaged,
        writable_permissions: true,
    }
}

fn paths(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn setup() -> (TempDir, TempDir, BackupArchive) {
    let live = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    write_tree(
        live.path(),
        &tree(&[
            ("app/server.py", "v1 server"),
            ("app/model.py", "v1 model"),
            ("VERSION", "r1\n"),
        ]),
    );
    let archive = BackupArchive::new(Dir::new(data.path().join("backups")), "VERSION", 0);
    (live, data, archive)
}

#[tokio::test]
async fn test_restore_returns_tree_to_snapshot() {
    let (live, _data, archive) = setup();
    let descriptor = descriptor(live.path());
    let before = read_tree(live.path());

    let record = archive
        .create(
            &descriptor,
            "r1",
            &paths(&["app/server.py", "app/new_module.py"]),
        )
        .await
        .unwrap();
    assert_eq!(record.source_revision, "r1");
    assert_eq!(record.files_saved(), 2);
    assert!(!record.manifest["app/new_module.py"].existed);

    // Simulate an update
    write_tree(
        live.path(),
        &tree(&[
            ("app/server.py", "v2 server"),
            ("app/new_module.py", "v2 only"),
            ("VERSION", "r2\n"),
        ]),
    );

    archive.restore(&record.id, &descriptor).await.unwrap();
    assert_eq!(read_tree(live.path()), before);
}

#[tokio::test]
async fn test_restore_twice_is_idempotent() {
    let (live, _data, archive) = setup();
    let descriptor = descriptor(live.path());
    let before = read_tree(live.path());

    let record = archive
        .create(&descriptor, "r1", &paths(&["app/server.py", "lib/extra.py"]))
        .await
        .unwrap();
    write_tree(
        live.path(),
        &tree(&[("app/server.py", "v2"), ("lib/extra.py", "v2")]),
    );

    assert_ok!(archive.restore(&record.id, &descriptor).await);
    assert_ok!(archive.restore(&record.id, &descriptor).await);

    assert_eq!(read_tree(live.path()), before);
    assert!(!live.path().join("lib").exists());
}

#[tokio::test]
async fn test_corrupt_copy_fails_restore() {
    let (live, data, archive) = setup();
    let descriptor = descriptor(live.path());

    let record = archive
        .create(&descriptor, "r1", &paths(&["app/server.py"]))
        .await
        .unwrap();
    std::fs::write(
        data.path()
            .join("backups")
            .join(&record.id)
            .join("files/app/server.py"),
        "tampered",
    )
    .unwrap();

    let err = assert_err!(archive.restore(&record.id, &descriptor).await);
    assert!(matches!(err, UpdateError::RollbackFailed(_)));
}

#[tokio::test]
async fn test_list_is_newest_first_and_prune_keeps_newest() {
    let (live, _data, archive) = setup();
    let descriptor = descriptor(live.path());

    let mut ids = Vec::new();
    for rev in ["r1", "r2", "r3"] {
        let record = archive
            .create(&descriptor, rev, &paths(&["app/server.py"]))
            .await
            .unwrap();
        ids.push(record.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let listed = archive.list().await.unwrap();
    let revisions: Vec<&str> = listed.iter().map(|r| r.source_revision.as_str()).collect();
    assert_eq!(revisions, vec!["r3", "r2", "r1"]);
    let ranks: Vec<usize> = listed.iter().map(|r| r.retention_rank).collect();
    assert_eq!(ranks, vec![0, 1, 2]);

    let removed = archive.prune(2).await.unwrap();
    assert_eq!(removed, vec![ids[0].clone()]);
    assert_eq!(archive.list().await.unwrap().len(), 2);
    assert_eq!(
        archive.latest().await.unwrap().map(|r| r.source_revision),
        Some("r3".to_string())
    );
}

#[tokio::test]
async fn test_incomplete_snapshot_is_ignored() {
    let (_live, data, archive) = setup();
    std::fs::create_dir_all(data.path().join("backups/20260101T000000Z-r0/files")).unwrap();

    assert!(archive.list().await.unwrap().is_empty());
    assert!(matches!(
        archive.get("20260101T000000Z-r0").await,
        Err(UpdateError::NotFound(_))
    ));
    assert!(matches!(
        archive.get("../etc").await,
        Err(UpdateError::NotFound(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_survives_backup_and_restore() {
    let (live, _data, archive) = setup();
    let descriptor = descriptor(live.path());
    std::os::unix::fs::symlink("app", live.path().join("current")).unwrap();

    let record = archive
        .create(&descriptor, "r1", &paths(&["current"]))
        .await
        .unwrap();
    assert!(record.manifest["current"].existed);

    // The update turned the link into a regular file
    std::fs::remove_file(live.path().join("current")).unwrap();
    std::fs::write(live.path().join("current"), "v2").unwrap();

    assert_ok!(archive.restore(&record.id, &descriptor).await);
    let link = live.path().join("current");
    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("app"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_file_fails_backup_without_leftovers() {
    use std::os::unix::fs::PermissionsExt;

    let (live, data, archive) = setup();
    let descriptor = descriptor(live.path());
    let locked = live.path().join("app/model.py");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    if std::fs::read(&locked).is_ok() {
        // Running as root; permissions do not block reads
        return;
    }

    let result = archive
        .create(&descriptor, "r1", &paths(&["app/server.py", "app/model.py"]))
        .await;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();

    let err = assert_err!(result);
    assert!(matches!(err, UpdateError::BackupFailed(_)));
    assert!(archive.list().await.unwrap().is_empty());
    let leftovers = std::fs::read_dir(data.path().join("backups")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_directory_in_place_of_file_fails_backup_without_leftovers() {
    let (live, data, archive) = setup();
    let descriptor = descriptor(live.path());
    std::fs::create_dir_all(live.path().join("app/plugins")).unwrap();

    let err = assert_err!(
        archive
            .create(&descriptor, "r1", &paths(&["app/server.py", "app/plugins"]))
            .await
    );
    assert!(matches!(err, UpdateError::BackupFailed(_)));
    assert!(archive.list().await.unwrap().is_empty());
    let leftovers = std::fs::read_dir(data.path().join("backups")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_uncopyable_file_mid_snapshot_removes_partial_backup() {
    let (live, data, archive) = setup();
    let descriptor = descriptor(live.path());
    // Sorted after files that are copied first; opening a socket fails even for root
    let _socket = std::os::unix::net::UnixListener::bind(live.path().join("app/zz.sock")).unwrap();

    let err = assert_err!(
        archive
            .create(&descriptor, "r1", &paths(&["app/server.py", "app/zz.sock"]))
            .await
    );
    assert!(matches!(err, UpdateError::BackupFailed(_)));
    assert!(archive.list().await.unwrap().is_empty());
    let leftovers = std::fs::read_dir(data.path().join("backups")).unwrap().count();
    assert_eq!(leftovers, 0);
}

//! Applier and staging tests

use std::path::Path;

use vox_updater::deploy::applier::UpdateApplier;
use vox_updater::deploy::staging::Staging;
use vox_updater::detect::{DeploymentDescriptor, DeploymentKind, ServiceHandle};
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

#[tokio::test]
async fn test_apply_overlays_candidate_and_stamps_marker() {
    let live = tempfile::tempdir().unwrap();
    let staged = tempfile::tempdir().unwrap();
    write_tree(
        live.path(),
        &tree(&[
            ("app/server.py", "v1"),
            ("config/local.yaml", "operator edits"),
            ("models/base.bin", "weights"),
            ("VERSION", "r1\n"),
        ]),
    );
    write_tree(
        staged.path(),
        &tree(&[
            ("app/server.py", "v2"),
            ("app/streaming.py", "new"),
            ("config/local.yaml", "upstream default"),
            (".git/HEAD", "ref: refs/heads/main"),
        ]),
    );

    let applier = UpdateApplier::new(&["config/local.yaml".to_string()], "VERSION");
    let outcome = applier
        .apply(&Dir::new(staged.path()), &descriptor(live.path()), "r2")
        .await
        .into_result()
        .unwrap();

    assert_eq!(
        outcome.files_changed,
        vec!["app/server.py", "app/streaming.py", "VERSION"]
    );
    assert_eq!(
        read_tree(live.path()),
        tree(&[
            ("app/server.py", "v2"),
            ("app/streaming.py", "new"),
            ("config/local.yaml", "operator edits"),
            ("models/base.bin", "weights"),
            ("VERSION", "r2\n"),
        ])
    );
}

#[tokio::test]
async fn test_staging_is_wiped_between_sessions() {
    let live = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let staging = Staging::new(Dir::new(data.path().join("staging")), live.path()).unwrap();

    let first = staging.prepare("r2").await.unwrap();
    write_tree(first.path(), &tree(&[("stale.py", "old")]));
    staging.discard(&first).await;
    assert!(!first.path().exists());

    let second = staging.prepare("r2").await.unwrap();
    assert!(read_tree(second.path()).is_empty());

    staging.clear().await.unwrap();
    assert!(!second.path().exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_is_applied_as_link() {
    let live = tempfile::tempdir().unwrap();
    let staged = tempfile::tempdir().unwrap();
    write_tree(live.path(), &tree(&[("VERSION", "r1\n")]));
    write_tree(staged.path(), &tree(&[("vendor/player.js", "player")]));
    std::fs::create_dir_all(staged.path().join("static")).unwrap();
    std::os::unix::fs::symlink("../vendor", staged.path().join("static/lib")).unwrap();

    let applier = UpdateApplier::new(&[], "VERSION");
    let plan = applier.plan(&Dir::new(staged.path())).unwrap();
    assert!(plan.contains("static/lib"));

    let outcome = applier
        .apply(&Dir::new(staged.path()), &descriptor(live.path()), "r2")
        .await
        .into_result()
        .unwrap();
    assert!(outcome.files_changed.contains(&"static/lib".to_string()));

    let link = live.path().join("static/lib");
    assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("../vendor"));
    assert_eq!(
        std::fs::read_to_string(link.join("player.js")).unwrap(),
        "player"
    );
}

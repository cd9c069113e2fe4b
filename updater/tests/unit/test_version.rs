//! Version check tests

use std::sync::atomic::Ordering;

use vox_updater::errors::UpdateError;

use crate::fixtures::{tree, FakeRemote, Harness, HarnessOptions};

fn linear_remote(ids: &[&str]) -> FakeRemote {
    let remote = FakeRemote::new();
    for id in ids {
        remote.push(
            id,
            &format!("commit {}", id),
            tree(&[("app/server.py", &format!("{} server", id))]),
        );
    }
    remote
}

#[tokio::test]
async fn test_check_reports_commits_behind_newest_first() {
    let harness = Harness::new(linear_remote(&["r1", "r2", "r3", "r4"]), HarnessOptions::default());

    let info = harness.orchestrator.check().await.unwrap();
    assert_eq!(info.local_revision, "r1");
    assert_eq!(info.remote_revision, "r4");
    assert_eq!(info.commits_behind, Some(3));
    assert!(info.update_available());
    let ids: Vec<&str> = info.changelog.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["r4", "r3", "r2"]);

    // Checking never touches the install tree or starts a session
    assert_eq!(harness.marker(), "r1");
    assert!(harness.orchestrator.session().is_none());
    assert_eq!(harness.remote.materialize_calls.load(Ordering::SeqCst), 0);

    let status = harness.orchestrator.status().await;
    assert_eq!(status.current_version.as_deref(), Some("r1"));
    assert_eq!(status.last_check.and_then(|c| c.commits_behind), Some(3));
}

#[tokio::test]
async fn test_check_when_current() {
    let harness = Harness::new(linear_remote(&["r0", "r1"]), HarnessOptions::default());

    let info = harness.orchestrator.check().await.unwrap();
    assert_eq!(info.commits_behind, Some(0));
    assert!(info.changelog.is_empty());
    assert!(!info.update_available());
}

#[tokio::test]
async fn test_unknown_local_revision_reports_recent_history() {
    let harness = Harness::new(
        linear_remote(&["r2", "r3"]),
        HarnessOptions {
            installed_revision: "local-build",
            ..HarnessOptions::default()
        },
    );

    let info = harness.orchestrator.check().await.unwrap();
    assert_eq!(info.remote_revision, "r3");
    assert_eq!(info.commits_behind, None);
    assert!(info.update_available());
    let ids: Vec<&str> = info.changelog.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["r3", "r2"]);
}

#[tokio::test]
async fn test_unusual_local_marker_is_reported_as_off_branch() {
    let harness = Harness::new(
        linear_remote(&["r2", "r3"]),
        HarnessOptions {
            installed_revision: "dev build 7",
            ..HarnessOptions::default()
        },
    );

    let info = harness.orchestrator.check().await.unwrap();
    assert_eq!(info.commits_behind, None);
    assert_eq!(info.changelog.len(), 2);
}

#[tokio::test]
async fn test_unreachable_remote() {
    let remote = linear_remote(&["r1", "r2"]);
    remote.unavailable.store(true, Ordering::SeqCst);
    let harness = Harness::new(remote, HarnessOptions::default());

    assert!(matches!(
        harness.orchestrator.check().await,
        Err(UpdateError::RemoteUnavailable(_))
    ));
    assert!(matches!(
        harness.orchestrator.history(10).await,
        Err(UpdateError::RemoteUnavailable(_))
    ));
}

#[tokio::test]
async fn test_history_is_limited() {
    let harness = Harness::new(linear_remote(&["r1", "r2", "r3", "r4"]), HarnessOptions::default());

    let history = harness.orchestrator.history(2).await.unwrap();
    let ids: Vec<&str> = history.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["r4", "r3"]);
}

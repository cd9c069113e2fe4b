//! FSM unit tests

use vox_updater::deploy::fsm::{UpdateEvent, UpdateFsm, UpdateState};

#[test]
fn test_fsm_initial_state() {
    let fsm = UpdateFsm::new();
    assert_eq!(fsm.state(), UpdateState::Idle);
    assert!(fsm.error().is_none());
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_compatibility_failure_is_terminal() {
    let mut fsm = UpdateFsm::new();

    fsm.process(UpdateEvent::BeginUpdate).unwrap();
    fsm.process(UpdateEvent::CompatibilityRejected("torch missing".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), UpdateState::CompatibilityFailed);
    assert_eq!(fsm.error(), Some("torch missing"));
    assert!(fsm.state().is_terminal());
    assert!(!fsm.state().live_tree_touched());
}

#[test]
fn test_fsm_cancel_only_before_applying() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::BeginUpdate).unwrap();
    assert!(fsm.state().is_cancellable());

    fsm.process(UpdateEvent::CompatibilityOk).unwrap();
    assert!(fsm.state().is_cancellable());

    fsm.process(UpdateEvent::BackupOk).unwrap();
    assert_eq!(fsm.state(), UpdateState::Applying);
    assert!(!fsm.state().is_cancellable());
    assert!(fsm.state().live_tree_touched());
}

#[test]
fn test_fsm_stop_failure_aborts_without_rollback() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::BeginUpdate).unwrap();
    fsm.process(UpdateEvent::CompatibilityOk).unwrap();
    fsm.process(UpdateEvent::BackupOk).unwrap();

    fsm.process(UpdateEvent::Abort("service did not stop".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpdateState::Failed);
}

#[test]
fn test_fsm_rollback_failure_is_failed() {
    let mut fsm = UpdateFsm::new();
    fsm.process(UpdateEvent::BeginRollback).unwrap();
    assert_eq!(fsm.state(), UpdateState::RollingBack);

    fsm.process(UpdateEvent::RollbackFailed("disk full".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpdateState::Failed);
    assert_eq!(fsm.error(), Some("disk full"));
}

#[test]
fn test_fsm_progress_is_monotonic_on_happy_path() {
    let path = [
        UpdateState::Idle,
        UpdateState::Checking,
        UpdateState::BackingUp,
        UpdateState::Applying,
        UpdateState::Restarting,
        UpdateState::Verifying,
        UpdateState::Completed,
    ];
    for pair in path.windows(2) {
        assert!(pair[0].progress_percent() < pair[1].progress_percent());
    }
}

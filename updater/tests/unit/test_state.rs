use std::path::Path;

use vox_updater::app::state::AppState;
use vox_updater::deploy::fsm::UpdateState;
use vox_updater::deploy::session::{SessionKind, SessionStore, UpdateSession};
use vox_updater::errors::UpdateError;
use vox_updater::storage::layout::StorageLayout;
use vox_updater::storage::lock::InstanceLock;
use vox_updater::storage::settings::Settings;

fn settings(install: &Path, data: &Path) -> Settings {
    Settings {
        install_root: install.to_path_buf(),
        data_dir: data.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_locked_install_is_left_alone_by_second_instance() {
    let install = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    let settings = settings(install.path(), data.path());
    let layout = StorageLayout::new(data.path());

    // Another process is mid-apply
    let held = InstanceLock::try_acquire(&layout.lock_file()).unwrap();
    let store = SessionStore::new(layout.session_file());
    let mut session = UpdateSession::new(SessionKind::Update);
    session.transition(UpdateState::Applying, "replacing files");
    store.save(&session).await.unwrap();
    let in_flight = data.path().join("staging").join(session.id.to_string());
    std::fs::create_dir_all(&in_flight).unwrap();

    let second = AppState::init(settings.clone()).await;
    assert!(matches!(second, Err(UpdateError::UpdateInProgress(_))));
    assert!(in_flight.exists());
    assert_eq!(store.load().await.unwrap().state, UpdateState::Applying);

    // Read-only access still sees the live session untouched
    let observer = AppState::observe(settings.clone()).await.unwrap();
    assert!(!observer.owns_install());
    assert_eq!(
        observer.orchestrator.session().map(|s| s.state),
        Some(UpdateState::Applying)
    );
    assert!(in_flight.exists());

    drop(held);
    let owner = AppState::init(settings).await.unwrap();
    assert!(owner.owns_install());
    assert_eq!(
        owner.orchestrator.session().map(|s| s.state),
        Some(UpdateState::Failed)
    );
    assert!(!in_flight.exists());
}

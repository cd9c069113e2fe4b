//! Integration tests for vox-updater

mod fixtures;
mod test_applier;
mod test_backup;
mod test_checker;
mod test_detect;
mod test_fsm;
mod test_server;
mod test_state;
mod test_version;

//! One-shot CLI commands
//!
//! Commands that start or observe sessions go through a running daemon's
//! admin API when one answers, so the daemon stays the only process writing
//! the install tree. Without a daemon they run in-process: `apply` and
//! `rollback` take the instance lock, read-only commands only look.

pub mod client;
pub mod print;

use std::time::Duration;

use admin_api::{BackupListResponse, HistoryResponse, SessionView};
use tracing::debug;

use crate::app::state::{detect, AppState};
use crate::cli::client::AdminClient;
use crate::errors::UpdateError;
use crate::server::views;
use crate::storage::settings::Settings;

/// Parsed CLI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Detect,
    Status,
    Check,
    Apply(Option<String>),
    Rollback(Option<String>),
    Backups,
    History(usize),
}

impl Command {
    /// `--key[=value]` flag to command; `value` is `"true"` for bare flags
    pub fn from_flag(key: &str, value: &str) -> Option<Self> {
        let explicit = (value != "true" && !value.is_empty()).then(|| value.to_string());
        match key {
            "detect" => Some(Command::Detect),
            "status" => Some(Command::Status),
            "check" => Some(Command::Check),
            "apply" => Some(Command::Apply(explicit)),
            "rollback" => Some(Command::Rollback(explicit)),
            "backups" => Some(Command::Backups),
            "history" => Some(Command::History(
                explicit.and_then(|v| v.parse().ok()).unwrap_or(20),
            )),
            _ => None,
        }
    }

    /// True for commands that may modify the install tree
    pub fn mutates(&self) -> bool {
        matches!(self, Command::Apply(_) | Command::Rollback(_))
    }
}

enum Backend {
    Daemon(AdminClient),
    Local(Box<AppState>),
}

async fn backend(settings: &Settings, command: &Command) -> Result<Backend, UpdateError> {
    if settings.server.enabled {
        let client = AdminClient::new(
            &settings.server.host,
            settings.server.port,
            settings.repository.network_timeout() + Duration::from_secs(5),
        )?;
        if client.is_reachable().await {
            debug!("Using running daemon");
            return Ok(Backend::Daemon(client));
        }
    }
    let state = if command.mutates() {
        AppState::init(settings.clone()).await?
    } else {
        AppState::observe(settings.clone()).await?
    };
    debug!("Running in-process (owns install: {})", state.owns_install());
    Ok(Backend::Local(Box::new(state)))
}

/// Run `command`; `Ok(false)` when it ran but did not succeed
pub async fn execute(command: Command, settings: &Settings) -> Result<bool, UpdateError> {
    if command == Command::Detect {
        print::deployment(&views::deployment_view(&detect(settings)));
        return Ok(true);
    }

    let backend = backend(settings, &command).await?;
    match (command, backend) {
        (Command::Status, Backend::Daemon(client)) => print::status(&client.status().await?),
        (Command::Status, Backend::Local(state)) => {
            print::status(&views::status_response(&state.orchestrator.status().await))
        }

        (Command::Check, Backend::Daemon(client)) => print::version_info(&client.check().await?),
        (Command::Check, Backend::Local(state)) => {
            print::version_info(&views::version_info_view(&state.orchestrator.check().await?))
        }

        (Command::Apply(revision), Backend::Daemon(client)) => {
            let started = client.apply(revision).await?;
            return follow_daemon(&client, started.session_id, "completed").await;
        }
        (Command::Apply(revision), Backend::Local(state)) => {
            state.orchestrator.apply(revision).await?;
            return follow_local(&state, "completed").await;
        }

        (Command::Rollback(id), Backend::Daemon(client)) => {
            let started = client.rollback(id).await?;
            return follow_daemon(&client, started.session_id, "rolled_back").await;
        }
        (Command::Rollback(id), Backend::Local(state)) => {
            state.orchestrator.rollback(id).await?;
            return follow_local(&state, "rolled_back").await;
        }

        (Command::Backups, Backend::Daemon(client)) => print::backups(&client.backups().await?),
        (Command::Backups, Backend::Local(state)) => {
            let backups: Vec<_> = state
                .orchestrator
                .backups()
                .await?
                .iter()
                .map(views::backup_view)
                .collect();
            let total = backups.len();
            print::backups(&BackupListResponse { backups, total });
        }

        (Command::History(limit), Backend::Daemon(client)) => {
            print::history(&client.history(limit).await?)
        }
        (Command::History(limit), Backend::Local(state)) => {
            let commits: Vec<_> = state
                .orchestrator
                .history(limit)
                .await?
                .iter()
                .map(views::commit_view)
                .collect();
            let total = commits.len();
            print::history(&HistoryResponse { commits, total });
        }

        (Command::Detect, _) => {}
    }
    Ok(true)
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn report_progress(view: &SessionView, last: &mut Option<String>) {
    let line = format!("{}: {}", view.state, view.detail_message);
    if last.as_deref() != Some(line.as_str()) {
        println!("  {}", line);
        *last = Some(line);
    }
}

async fn follow_daemon(
    client: &AdminClient,
    session_id: uuid::Uuid,
    success_state: &str,
) -> Result<bool, UpdateError> {
    let mut last = None;
    loop {
        let status = client.status().await?;
        if let Some(session) = status.session.filter(|s| s.id == session_id) {
            report_progress(&session, &mut last);
            if session.terminal {
                print::session(&session);
                return Ok(session.state == success_state);
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn follow_local(state: &AppState, success_state: &str) -> Result<bool, UpdateError> {
    let mut last = None;
    loop {
        if let Some(session) = state.orchestrator.session() {
            let view = views::session_view(&session);
            report_progress(&view, &mut last);
            if view.terminal {
                // Let the task release its guard before returning
                let session = state
                    .orchestrator
                    .wait_for_terminal(Duration::from_secs(10))
                    .await?;
                let view = views::session_view(&session);
                print::session(&view);
                return Ok(view.state == success_state);
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

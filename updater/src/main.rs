//! vox-updater - Entry Point
//!
//! Keeps a Vox speech-to-text installation in sync with its code repository:
//! detects newer revisions, installs them in place, restarts the service and
//! rolls back when the new revision does not come up healthy.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use tracing::{error, info, warn};

use vox_updater::app::options::AppOptions;
use vox_updater::app::run::run;
use vox_updater::app::state::AppState;
use vox_updater::cli::{self, print, Command};
use vox_updater::logs::{init_logging, LogLevel, LogOptions};
use vox_updater::storage::layout::{settings_file, StorageLayout};
use vox_updater::storage::settings::Settings;
use vox_updater::utils::build_info;

const COMMAND_FLAGS: &[&str] = &[
    "detect", "status", "check", "apply", "rollback", "backups", "history",
];

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&build_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => print::error(&e.to_string()),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let file = settings_file(cli_args.get("config").map(String::as_str));
    let settings = if file.exists().await {
        match Settings::load(&file).await {
            Ok(settings) => settings,
            Err(e) => {
                print::error(&format!("Unable to read settings: {}", e));
                return ExitCode::FAILURE;
            }
        }
    } else {
        eprintln!(
            "Settings file {} not found, using defaults",
            file.path().display()
        );
        Settings::default()
    };

    let command = COMMAND_FLAGS.iter().find_map(|flag| {
        cli_args
            .get(*flag)
            .and_then(|value| Command::from_flag(flag, value))
    });

    match command {
        Some(command) => run_command(command, &settings).await,
        None => run_daemon(settings).await,
    }
}

async fn run_command(command: Command, settings: &Settings) -> ExitCode {
    // One-shot commands only surface warnings unless RUST_LOG says otherwise
    let log_options = LogOptions {
        log_level: LogLevel::Warn,
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli::execute(command, settings).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            print::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run_daemon(settings: Settings) -> ExitCode {
    // Initialize logging
    let layout = StorageLayout::new(&settings.data_dir);
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    // Flushes the file writer on drop
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let build = build_info();
    info!(
        "vox-updater {} ({}, built {})",
        build.version, build.git_hash, build.build_time
    );

    let options = AppOptions::from_settings(&settings);
    if !options.enable_admin_server && !options.enable_checker {
        warn!("Admin API and auto-check are both disabled; the daemon will only idle");
    }

    let app_state = match AppState::init(settings).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Running vox-updater with options: {:?}", options);
    match run(app_state, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the updater: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}

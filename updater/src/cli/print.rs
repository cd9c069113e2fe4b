//! Terminal output for CLI commands

use admin_api::{
    BackupListResponse, CommitView, DeploymentView, HistoryResponse, SessionView,
    StatusResponse, VersionInfoView,
};
use colored::Colorize;

use crate::utils::short_revision;

fn commit_line(commit: &CommitView) -> String {
    let when = commit
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!(
        "  {} {} {}",
        short_revision(&commit.id).yellow(),
        when.dimmed(),
        commit.message
    )
}

pub fn deployment(view: &DeploymentView) {
    println!("{}", "Deployment".bold());
    println!("  kind:         {}", view.kind.cyan());
    println!("  install root: {}", view.install_root);
    println!("  service:      {}", view.service_handle);
    let writable = if view.writable_permissions {
        "yes".green()
    } else {
        "no".red()
    };
    println!("  writable:     {}", writable);
}

pub fn version_info(info: &VersionInfoView) {
    println!("{}", "Remote check".bold());
    println!("  installed: {}", short_revision(&info.local_revision));
    println!("  remote:    {}", short_revision(&info.remote_revision));
    if info.update_available {
        println!(
            "  {}",
            match info.commits_behind {
                Some(n) => format!("{} commits behind", n),
                None => "installed revision is not on the tracked branch".to_string(),
            }
                .yellow()
                .bold()
        );
        for commit in &info.changelog {
            println!("{}", commit_line(commit));
        }
    } else {
        println!("  {}", "up to date".green());
    }
}

pub fn session(session: &SessionView) {
    let state = match session.state.as_str() {
        "completed" | "rolled_back" => session.state.green(),
        "failed" | "compatibility_failed" => session.state.red(),
        _ => session.state.yellow(),
    };
    println!(
        "{} {} {} ({}%)",
        session.kind.bold(),
        session.id.to_string().dimmed(),
        state,
        session.progress_percent
    );
    println!("  {}", session.detail_message);
    if let (Some(from), Some(to)) = (&session.source_revision, &session.target_revision) {
        println!("  {} -> {}", short_revision(from), short_revision(to));
    }
    if let Some(backup) = &session.backup_id {
        println!("  backup: {}", backup);
    }
    if session.files_changed > 0 {
        println!("  files changed: {}", session.files_changed);
    }
    if let Some(error) = &session.error {
        println!("  {} {}: {}", "error".red().bold(), error.kind, error.message);
    }
}

pub fn status(status: &StatusResponse) {
    match &status.current_version {
        Some(version) => println!("{} {}", "Installed:".bold(), version),
        None => println!("{} {}", "Installed:".bold(), "unknown (no version marker)".red()),
    }
    deployment(&status.deployment);
    if let Some(info) = &status.version_info {
        version_info(info);
    }
    match &status.session {
        Some(s) => session(s),
        None => println!("{}", "No update session recorded".dimmed()),
    }
}

pub fn backups(list: &BackupListResponse) {
    if list.backups.is_empty() {
        println!("{}", "No backups".dimmed());
        return;
    }
    println!("{} ({})", "Backups".bold(), list.total);
    for backup in &list.backups {
        println!(
            "  #{} {} {} {} files, revision {}",
            backup.retention_rank,
            backup.id.cyan(),
            backup.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            backup.files,
            short_revision(&backup.source_revision)
        );
    }
}

pub fn history(history: &HistoryResponse) {
    println!("{} ({})", "History".bold(), history.total);
    for commit in &history.commits {
        println!("{}", commit_line(commit));
    }
}

pub fn error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

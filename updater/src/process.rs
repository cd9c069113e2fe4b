//! External command execution

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::UpdateError;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl CommandOutput {
    /// Short description used in error messages
    pub fn describe(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.code, stderr.is_empty()) {
            (Some(code), true) => format!("exit code {}", code),
            (Some(code), false) => format!("exit code {}: {}", code, stderr),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {}", stderr),
        }
    }
}

/// Run `program args...` to completion, capturing output.
///
/// Spawn failures and timeouts are returned as `io::Error`s; a non-zero exit
/// is reported through `CommandOutput::success` so callers pick the error
/// variant that fits their step.
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, UpdateError> {
    debug!("Running {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|e| {
        UpdateError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to run {}: {}", program, e),
        ))
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?.into()),
        Err(_) => Err(UpdateError::IoError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("{} timed out after {:?}", program, timeout),
        ))),
    }
}

/// Start a long-running shell command detached from the updater
pub async fn spawn_detached(command_line: &str, cwd: &Path) -> Result<(), UpdateError> {
    debug!("Spawning detached: {}", command_line);
    let line = format!("nohup {} > /dev/null 2>&1 &", command_line);
    let output = run("sh", &["-c", &line], Some(cwd), Duration::from_secs(10)).await?;
    if !output.success {
        return Err(UpdateError::RestartFailed(format!(
            "Failed to start `{}`: {}",
            command_line,
            output.describe()
        )));
    }
    Ok(())
}

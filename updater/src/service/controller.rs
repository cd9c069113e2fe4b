//! Service control per deployment kind

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::detect::{DeploymentDescriptor, DeploymentKind, ServiceHandle};
use crate::errors::UpdateError;
use crate::process;
use crate::service::health::{wait_healthy, HealthProbe};
use crate::service::ServiceControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Stop,
    Start,
    Restart,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Stop => "stop",
            Action::Start => "start",
            Action::Restart => "restart",
        }
    }
}

/// Drives the supervisor that owns the hosted service
pub struct ServiceController {
    kind: DeploymentKind,
    handle: ServiceHandle,
    install_root: PathBuf,
    command_timeout: Duration,
    probe: Arc<dyn HealthProbe>,
    poll_interval: Duration,
}

impl ServiceController {
    pub fn new(
        descriptor: &DeploymentDescriptor,
        probe: Arc<dyn HealthProbe>,
        command_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            kind: descriptor.kind,
            handle: descriptor.service_handle.clone(),
            install_root: descriptor.install_root.clone(),
            command_timeout,
            probe,
            poll_interval,
        }
    }

    /// Supervisor command for `action`; `None` when the supervisor is not asked
    fn supervisor_command(&self, action: Action) -> Option<(&'static str, Vec<String>)> {
        match (&self.handle, action) {
            (ServiceHandle::SystemdUnit(unit), _) => {
                Some(("systemctl", vec![action.as_str().to_string(), unit.clone()]))
            }
            // The updater shares the container, so the service keeps running
            // while files are replaced and one restart picks them up
            (ServiceHandle::Container(_), Action::Stop) => None,
            (ServiceHandle::Container(name), Action::Start | Action::Restart) => {
                Some(("docker", vec!["restart".to_string(), name.clone()]))
            }
            (ServiceHandle::Process(_) | ServiceHandle::Unmanaged, _) => None,
        }
    }

    async fn control(&self, action: Action) -> Result<(), UpdateError> {
        info!("Service {}: {} ({})", action.as_str(), self.handle, self.kind);
        match &self.handle {
            ServiceHandle::SystemdUnit(_) | ServiceHandle::Container(_) => {
                match self.supervisor_command(action) {
                    Some((program, args)) => {
                        let args: Vec<&str> = args.iter().map(String::as_str).collect();
                        self.checked(program, &args, action).await
                    }
                    None => {
                        info!(
                            "Container {} keeps running until the restart",
                            self.handle
                        );
                        Ok(())
                    }
                }
            }
            ServiceHandle::Process(command) => match action {
                Action::Stop => self.kill_process(command).await,
                Action::Start => self.spawn_process(command).await,
                Action::Restart => {
                    self.kill_process(command).await?;
                    self.spawn_process(command).await
                }
            },
            ServiceHandle::Unmanaged => {
                warn!(
                    "No managed restart for {} deployment, skipping {}",
                    self.kind,
                    action.as_str()
                );
                Ok(())
            }
        }
    }

    async fn checked(&self, program: &str, args: &[&str], action: Action) -> Result<(), UpdateError> {
        let output = process::run(program, args, None, self.command_timeout)
            .await
            .map_err(|e| failure(action, e.to_string()))?;
        if !output.success {
            return Err(failure(
                action,
                format!("{} {} failed: {}", program, args.join(" "), output.describe()),
            ));
        }
        Ok(())
    }

    async fn kill_process(&self, command: &str) -> Result<(), UpdateError> {
        let output = process::run("pkill", &["-f", command], None, self.command_timeout)
            .await
            .map_err(|e| failure(Action::Stop, e.to_string()))?;
        // pkill exits 1 when nothing matched, which is already the goal
        match output.code {
            Some(0) | Some(1) => Ok(()),
            _ => Err(failure(
                Action::Stop,
                format!("pkill -f {} failed: {}", command, output.describe()),
            )),
        }
    }

    async fn spawn_process(&self, command: &str) -> Result<(), UpdateError> {
        process::spawn_detached(command, &self.install_root)
            .await
            .map_err(|e| failure(Action::Start, e.to_string()))
    }
}

fn failure(action: Action, message: String) -> UpdateError {
    match action {
        // Stop happens before any file is written; apply is the step it blocks
        Action::Stop => UpdateError::ApplyFailed(format!("Could not stop service: {}", message)),
        Action::Start | Action::Restart => UpdateError::RestartFailed(message),
    }
}

#[async_trait]
impl ServiceControl for ServiceController {
    async fn stop(&self) -> Result<(), UpdateError> {
        self.control(Action::Stop).await
    }

    async fn start(&self) -> Result<(), UpdateError> {
        self.control(Action::Start).await
    }

    async fn restart(&self) -> Result<(), UpdateError> {
        self.control(Action::Restart).await
    }

    async fn health_check(&self, timeout: Duration) -> Result<(), UpdateError> {
        wait_healthy(self.probe.as_ref(), timeout, self.poll_interval).await
    }
}

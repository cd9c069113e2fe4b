//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;
use crate::workers::checker;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Enable local admin API
    pub enable_admin_server: bool,

    /// Enable periodic remote checks
    pub enable_checker: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Checker worker options
    pub checker: checker::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            enable_admin_server: true,
            enable_checker: false,
            server: ServerOptions::default(),
            checker: checker::Options::default(),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enable_admin_server: settings.server.enabled,
            enable_checker: settings.auto_check.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            checker: checker::Options {
                interval: Duration::from_secs(settings.auto_check.interval_secs.max(60)),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Lifecycle options for the daemon
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,

    /// How long shutdown waits for a running update or rollback
    pub max_session_wait: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
            max_session_wait: Duration::from_secs(300),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
        }
    }
}

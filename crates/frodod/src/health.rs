//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use frodo_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the command listener accepts connections.
    fn listener_ready(&self, endpoint: &SocketEndpoint);

    /// Invoked when a shutdown has been requested.
    fn shutdown_started(&self, cause: &str);

    /// Invoked once the listener has stopped.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        (**self).listener_ready(endpoint);
    }

    fn shutdown_started(&self, cause: &str) {
        (**self).shutdown_started(cause);
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        let restart = config.restart_policy();
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.daemon_socket(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            error_code_base = config.error_code_base(),
            restart_software = restart.software,
            restart_hardware = restart.hardware,
            restart_power_off = restart.power_off,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            %error,
            "daemon bootstrap failed"
        );
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            %endpoint,
            "accepting commands"
        );
    }

    fn shutdown_started(&self, cause: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_started",
            cause,
            "daemon shutting down"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "daemon stopped"
        );
    }
}

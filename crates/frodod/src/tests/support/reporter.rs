//! Test double for [`HealthReporter`] that records lifecycle events.

use std::sync::Mutex;

use frodo_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Lifecycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ListenerReady(String),
    ShutdownStarted(String),
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub(crate) fn saw(&self, predicate: impl Fn(&HealthEvent) -> bool) -> bool {
        self.events().iter().any(predicate)
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ListenerReady(endpoint.to_string()));
    }

    fn shutdown_started(&self, cause: &str) {
        self.record(HealthEvent::ShutdownStarted(cause.to_owned()));
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

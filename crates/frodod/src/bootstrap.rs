//! Daemon bootstrap: configuration, telemetry, socket directory and the
//! shared command context.

use std::sync::Arc;

use frodo_config::{Config, SocketPreparationError};
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use crate::context::{Collaborators, ServerContext};
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Configuration source, abstracted for tests.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no valid configuration is available.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
}

/// Result of a successful bootstrap.
pub struct Daemon {
    config: Config,
    context: Arc<ServerContext>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Shared state handed to every connection.
    #[must_use]
    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.context)
    }

    /// Telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Reporter for the remaining lifecycle events.
    #[must_use]
    pub fn reporter(&self) -> Arc<dyn HealthReporter> {
        Arc::clone(&self.reporter)
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, telemetry or socket
/// directory preparation fails. The reporter sees the failure first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    collaborators: Collaborators,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => return Err(fail(&*reporter, BootstrapError::Configuration { source })),
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => return Err(fail(&*reporter, BootstrapError::Telemetry { source })),
    };

    if let Err(source) = config.daemon_socket().prepare_filesystem() {
        return Err(fail(&*reporter, BootstrapError::Socket { source }));
    }

    let context = Arc::new(ServerContext::new(config.clone(), collaborators));
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        context,
        telemetry,
        reporter,
    })
}

fn fail(reporter: &dyn HealthReporter, error: BootstrapError) -> BootstrapError {
    reporter.bootstrap_failed(&error);
    error
}

use std::fmt;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Why the daemon is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// Shutdown was requested in-process.
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(SIGTERM) => formatter.write_str("SIGTERM"),
            Self::Signal(SIGINT) => formatter.write_str("SIGINT"),
            Self::Signal(SIGQUIT) => formatter.write_str("SIGQUIT"),
            Self::Signal(SIGHUP) => formatter.write_str("SIGHUP"),
            Self::Signal(other) => write!(formatter, "signal {other}"),
            Self::Requested => formatter.write_str("requested"),
        }
    }
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the notification source cannot be set
    /// up.
    fn wait(&self) -> Result<ShutdownCause, ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for SIGTERM, SIGINT, SIGQUIT or SIGHUP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let cause = signals
            .forever()
            .next()
            .map_or(ShutdownCause::Requested, ShutdownCause::Signal);
        info!(target: PROCESS_TARGET, %cause, "shutdown signal received");
        Ok(cause)
    }
}

//! Process lifecycle: bootstrap, listen, wait for a shutdown signal, stop.
//!
//! The daemon stays in the foreground; supervision and restarts after a
//! `restart` command's exit belong to the service manager.

mod errors;
pub(crate) mod launch;
pub(crate) mod shutdown;

pub use errors::LaunchError;
pub use launch::run_daemon;
pub use shutdown::{ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

//! Command core of the FRODO spectrograph daemon.
//!
//! The daemon accepts one JSON command per connection on a configured socket
//! and drives the instrument's two arms through the [`hardware`]
//! collaborators. Each connection runs on its own thread and answers with
//! acknowledgements followed by exactly one completion; see the `dispatch`
//! module for the wire format.
//!
//! Commands on different arms run concurrently. Three pieces of shared state
//! keep them apart:
//!
//! - the arm registry records which command owns each arm and carries the
//!   abort flags polled at every checkpoint;
//! - the [`lamp::LampArbiter`] serialises access to the calibration lamp unit
//!   while letting both arms share one light-set;
//! - the [`terminator::Terminator`] holds back a restart's process exit until
//!   its completion has been written.
//!
//! Bootstrap loads configuration with `ortho_config`, initialises structured
//! telemetry and prepares the socket directory. Health reporting hooks emit a
//! record at each lifecycle stage.

mod arms;
mod bootstrap;
mod context;
mod dispatch;
pub mod hardware;
mod health;
pub mod lamp;
mod priority;
mod process;
mod telemetry;
pub mod terminator;
mod transport;

pub use arms::{Aborted, ArmRegistration, ArmRegistry, WorkerRef};
pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use context::{Collaborators, ServerContext};
pub use dispatch::{
    AbortStep, CommandFailure, ErrorFamily, Execution, ExecutionPhase, ProgressSink,
    ProtocolError, ProtocolSession, ProtocolState, ResponseError, ResponseWriter,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;

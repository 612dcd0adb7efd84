//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::context::Collaborators;
use crate::dispatch::DispatchConnectionHandler;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::transport::SocketListener;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the daemon runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) shutdown: S,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) collaborators: Collaborators,
}

/// Runs the daemon with production configuration and signal handling.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap, binding the listener or
/// installing signal handlers fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(LaunchPlan {
        loader: SystemConfigLoader,
        shutdown: SystemShutdownSignal::new(),
        reporter: Arc::new(StructuredHealthReporter::new()),
        collaborators: Collaborators::simulated(),
    })
}

/// Runs the daemon with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        shutdown,
        reporter,
        collaborators,
    } = plan;

    info!(target: PROCESS_TARGET, pid = std::process::id(), "starting daemon runtime");
    let daemon = bootstrap_with(&loader, Arc::clone(&reporter), collaborators)?;
    let context = daemon.context();

    let listener = SocketListener::bind(daemon.config().daemon_socket())?;
    let endpoint = listener.endpoint().clone();
    let handle = listener.start(Arc::new(DispatchConnectionHandler::new(Arc::clone(&context))))?;
    reporter.listener_ready(&endpoint);

    let waited = shutdown.wait();
    let cause = match &waited {
        Ok(cause) => cause.to_string(),
        Err(error) => error.to_string(),
    };
    reporter.shutdown_started(&cause);

    context.shutdown();
    handle.shutdown();
    if let Err(error) = handle.join() {
        warn!(target: PROCESS_TARGET, %error, "listener did not stop cleanly");
    }
    reporter.shutdown_completed();
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    waited.map(|_| ()).map_err(LaunchError::from)
}

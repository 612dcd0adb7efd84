//! Deferred process exit for `restart` commands.
//!
//! The connection thread serving a restart must deliver its completion
//! before the process goes away. [`Terminator::schedule`] spawns a thread
//! that waits on a latch; the connection thread opens the latch once the
//! completion has been written (or dropped the trigger on an error path).

use std::process;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use frodo_protocol::RestartLevel;
use tracing::{error, info, warn};

use crate::hardware::CollaboratorError;

const TERMINATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::terminator");

/// Upper bound on waiting for the completion to be delivered.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Host power control used by the hardware and power-off restart levels.
#[cfg_attr(test, mockall::automock)]
pub trait HostControl: Send + Sync {
    /// Reboots the controller host.
    fn reboot(&self) -> Result<(), CollaboratorError>;

    /// Powers the controller host off.
    fn power_off(&self) -> Result<(), CollaboratorError>;
}

/// Ends the process.
pub trait ProcessExit: Send + Sync {
    /// Exits with `status`. Production implementations do not return.
    fn exit(&self, status: i32);
}

/// Host control that asks the service manager to reboot or power off.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostControl;

impl SystemHostControl {
    fn systemctl(verb: &'static str) -> Result<(), CollaboratorError> {
        let status = process::Command::new("systemctl")
            .arg(verb)
            .status()
            .map_err(|source| CollaboratorError::new(verb, source.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(CollaboratorError::new(verb, format!("systemctl exited with {status}")))
        }
    }
}

impl HostControl for SystemHostControl {
    fn reboot(&self) -> Result<(), CollaboratorError> {
        Self::systemctl("reboot")
    }

    fn power_off(&self) -> Result<(), CollaboratorError> {
        Self::systemctl("poweroff")
    }
}

/// Exits via [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessExit;

impl ProcessExit for SystemProcessExit {
    fn exit(&self, status: i32) {
        process::exit(status);
    }
}

/// Exit status reported to the service manager for each restart level.
#[must_use]
pub const fn exit_status(level: RestartLevel) -> i32 {
    match level {
        RestartLevel::Reinitialise => 0,
        RestartLevel::Software => 75,
        RestartLevel::Hardware => 76,
        RestartLevel::PowerOff => 77,
    }
}

type Latch = Arc<(Mutex<bool>, Condvar)>;

/// Schedules process termination behind a delivery latch.
#[derive(Clone)]
pub struct Terminator {
    host: Arc<dyn HostControl>,
    exit: Arc<dyn ProcessExit>,
    timeout: Duration,
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Terminator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Terminator {
    /// Builds a terminator waiting at most [`DELIVERY_TIMEOUT`].
    pub fn new(host: Arc<dyn HostControl>, exit: Arc<dyn ProcessExit>) -> Self {
        Self {
            host,
            exit,
            timeout: DELIVERY_TIMEOUT,
        }
    }

    /// Overrides the delivery timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawns the terminating thread for `level`.
    ///
    /// # Errors
    ///
    /// Returns the spawn error when the thread cannot be created.
    pub fn schedule(&self, level: RestartLevel) -> std::io::Result<TerminationTrigger> {
        let latch: Latch = Arc::new((Mutex::new(false), Condvar::new()));
        let waiting = Arc::clone(&latch);
        let host = Arc::clone(&self.host);
        let exit = Arc::clone(&self.exit);
        let timeout = self.timeout;
        thread::Builder::new()
            .name(String::from("frodod-terminator"))
            .spawn(move || {
                wait_for_delivery(&waiting, timeout);
                terminate(level, host.as_ref(), exit.as_ref());
            })?;
        info!(target: TERMINATOR_TARGET, %level, "termination scheduled");
        Ok(TerminationTrigger { latch })
    }
}

fn wait_for_delivery(latch: &Latch, timeout: Duration) {
    let (lock, delivered) = &**latch;
    let deadline = Instant::now() + timeout;
    let mut released = lock.lock().unwrap_or_else(PoisonError::into_inner);
    while !*released {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                target: TERMINATOR_TARGET,
                timeout_ms = timeout.as_millis(),
                "completion not delivered in time; terminating anyway"
            );
            return;
        }
        released = delivered
            .wait_timeout(released, remaining)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

fn terminate(level: RestartLevel, host: &dyn HostControl, exit: &dyn ProcessExit) {
    let host_result = match level {
        RestartLevel::Hardware => Some(host.reboot()),
        RestartLevel::PowerOff => Some(host.power_off()),
        RestartLevel::Reinitialise | RestartLevel::Software => None,
    };
    if let Some(Err(failure)) = host_result {
        error!(target: TERMINATOR_TARGET, %level, error = %failure, "host control failed");
    }
    let status = exit_status(level);
    info!(target: TERMINATOR_TARGET, %level, status, "terminating process");
    exit.exit(status);
}

/// Opens the delivery latch when released or dropped.
#[derive(Debug)]
pub struct TerminationTrigger {
    latch: Latch,
}

impl TerminationTrigger {
    /// Lets the terminating thread proceed.
    pub fn release(self) {
        drop(self);
    }

    fn open(&self) {
        let (lock, delivered) = &*self.latch;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        delivered.notify_all();
    }
}

impl Drop for TerminationTrigger {
    fn drop(&mut self) {
        self.open();
    }
}

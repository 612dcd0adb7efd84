//! Scheduling priority for interrupt-class command threads.

use tracing::debug;

const PRIORITY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::priority");

/// Nice value requested by interrupt threads.
#[cfg(unix)]
const INTERRUPT_NICE: libc::c_int = -10;

/// Raises the calling thread's scheduling priority.
///
/// Lowering the nice value needs `CAP_SYS_NICE`; without it the thread keeps
/// its priority and the refusal is logged. Returns whether the change took
/// effect.
#[cfg(unix)]
pub fn elevate_current_thread() -> bool {
    // SAFETY: `setpriority` only reads its integer arguments. On Linux a
    // `who` of zero with `PRIO_PROCESS` addresses the calling thread.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, INTERRUPT_NICE) };
    if result == 0 {
        debug!(target: PRIORITY_TARGET, nice = INTERRUPT_NICE, "interrupt thread priority raised");
        true
    } else {
        debug!(
            target: PRIORITY_TARGET,
            error = %std::io::Error::last_os_error(),
            "interrupt thread priority unchanged"
        );
        false
    }
}

/// Raises the calling thread's scheduling priority.
#[cfg(not(unix))]
pub fn elevate_current_thread() -> bool {
    debug!(target: PRIORITY_TARGET, "thread priorities unsupported on this platform");
    false
}

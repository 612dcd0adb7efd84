//! Arbitration of the calibration lamp unit shared by both arms.
//!
//! The unit can show one light-set at a time. Callers asking for the light-set
//! that is already active share it; anyone else waits until the last holder
//! releases. Science exposures ask for [`LampRequest::NoLamp`], which excludes
//! every lit set but is shared with other science exposures.
//!
//! The state lock is never held across a driver call. Driver calls are
//! serialised by a second lock so that a release switching the unit off cannot
//! interleave with a new holder switching it on.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use frodo_protocol::{LampLabel, LampStatus};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hardware::{CollaboratorError, LampUnitDriver};

const LAMP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lamp");

/// Label reported for a hold on the dark unit.
pub const NO_LAMP_LABEL: &str = "none";

/// What a caller needs the lamp unit to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LampRequest {
    /// Every lamp dark.
    NoLamp,
    /// The named light-set lit.
    Lamps(LampLabel),
}

impl LampRequest {
    /// Light-set to switch on, if any.
    #[must_use]
    pub const fn label(&self) -> Option<&LampLabel> {
        match self {
            Self::NoLamp => None,
            Self::Lamps(label) => Some(label),
        }
    }
}

impl fmt::Display for LampRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLamp => formatter.write_str(NO_LAMP_LABEL),
            Self::Lamps(label) => write!(formatter, "{label}"),
        }
    }
}

/// Errors raised while acquiring or releasing the lamp unit.
#[derive(Debug, Error)]
pub enum LampError {
    /// The wait ended before the unit became available.
    #[error("lamp wait interrupted: {reason}")]
    WaitInterrupted {
        /// Why the wait ended.
        reason: String,
    },
    /// The lamp unit rejected a command.
    #[error("lamp unit failure: {source}")]
    Unit {
        /// Driver error.
        #[source]
        source: CollaboratorError,
    },
    /// A thread panicked while holding the arbiter state.
    #[error("lamp arbiter state poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for LampError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

#[derive(Debug, Default)]
struct LampState {
    active: Option<LampRequest>,
    holders: usize,
    shut_down: bool,
    wakes: u64,
}

impl LampState {
    fn admits(&self, request: &LampRequest) -> bool {
        self.holders == 0 || self.active.as_ref() == Some(request)
    }
}

/// Reference-counted, label-keyed lock over the lamp unit.
pub struct LampArbiter {
    state: Mutex<LampState>,
    available: Condvar,
    switch: Mutex<()>,
    driver: Arc<dyn LampUnitDriver>,
    wait_interval: Duration,
}

impl fmt::Debug for LampArbiter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LampArbiter")
            .field("wait_interval", &self.wait_interval)
            .finish_non_exhaustive()
    }
}

impl LampArbiter {
    /// Builds an arbiter that wakes waiters every `wait_interval`.
    pub fn new(driver: Arc<dyn LampUnitDriver>, wait_interval: Duration) -> Self {
        Self {
            state: Mutex::new(LampState::default()),
            available: Condvar::new(),
            switch: Mutex::new(()),
            driver,
            wait_interval: wait_interval.max(Duration::from_millis(1)),
        }
    }

    /// Interval between keep-alive callbacks while waiting.
    #[must_use]
    pub const fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    /// Waits until `request` can hold the unit, then switches it.
    ///
    /// While blocked, `keep_alive` runs once per wait interval and after
    /// every [`LampArbiter::wake`]. Returning an error from it abandons the
    /// wait. Once admitted the unit is switched
    /// off and, unless `request` is [`LampRequest::NoLamp`], the requested
    /// light-set is switched on. A failing switch gives the hold back.
    ///
    /// # Errors
    ///
    /// Returns [`LampError::WaitInterrupted`] when `keep_alive` fails or the
    /// arbiter shuts down, and [`LampError::Unit`] when the driver fails.
    pub fn acquire<F, E>(
        &self,
        request: LampRequest,
        mut keep_alive: F,
    ) -> Result<LampGuard<'_>, LampError>
    where
        F: FnMut() -> Result<(), E>,
        E: fmt::Display,
    {
        let mut state = self.state.lock()?;
        let mut next_keep_alive = Instant::now() + self.wait_interval;
        let mut seen_wakes = state.wakes;
        let mut announced = false;
        loop {
            if state.shut_down {
                return Err(LampError::WaitInterrupted {
                    reason: String::from("lamp arbiter shut down"),
                });
            }
            if state.admits(&request) {
                state.active = Some(request.clone());
                state.holders += 1;
                debug!(
                    target: LAMP_TARGET,
                    request = %request,
                    holders = state.holders,
                    "lamp unit acquired"
                );
                break;
            }
            if !announced {
                info!(
                    target: LAMP_TARGET,
                    request = %request,
                    active = ?state.active,
                    holders = state.holders,
                    "waiting for lamp unit"
                );
                announced = true;
            }
            let remaining = next_keep_alive.saturating_duration_since(Instant::now());
            let (next, _) = self.available.wait_timeout(state, remaining)?;
            state = next;
            let woken = state.wakes != seen_wakes;
            if (woken || Instant::now() >= next_keep_alive)
                && !state.admits(&request)
                && !state.shut_down
            {
                seen_wakes = state.wakes;
                drop(state);
                keep_alive().map_err(|error| LampError::WaitInterrupted {
                    reason: error.to_string(),
                })?;
                next_keep_alive = Instant::now() + self.wait_interval;
                state = self.state.lock()?;
            }
        }
        drop(state);

        let guard = LampGuard {
            arbiter: self,
            request,
            released: false,
        };
        if let Err(source) = self.switch_on(&guard.request) {
            warn!(
                target: LAMP_TARGET,
                request = %guard.request,
                error = %source,
                "lamp unit switch failed; releasing hold"
            );
            drop(guard);
            return Err(LampError::Unit { source });
        }
        Ok(guard)
    }

    fn switch_on(&self, request: &LampRequest) -> Result<(), CollaboratorError> {
        let _switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
        self.driver.all_off()?;
        if let Some(label) = request.label() {
            self.driver.turn_on(label)?;
        }
        Ok(())
    }

    fn release_hold(&self, request: &LampRequest) -> Result<(), LampError> {
        let mut state = self.lock_state();
        state.holders = state.holders.saturating_sub(1);
        debug!(
            target: LAMP_TARGET,
            request = %request,
            holders = state.holders,
            "lamp unit released"
        );
        if state.holders > 0 {
            return Ok(());
        }
        state.active = None;
        self.available.notify_all();
        drop(state);

        let _switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
        // A waiter admitted since the count reached zero switches the unit
        // itself once it gets the switch lock.
        if self.lock_state().holders > 0 {
            return Ok(());
        }
        self.driver
            .all_off()
            .map_err(|source| LampError::Unit { source })
    }

    fn lock_state(&self) -> MutexGuard<'_, LampState> {
        // Release must make progress even after a panic elsewhere; the count
        // and label are updated together so the state stays coherent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes every waiter and fails their acquisitions.
    pub fn shutdown(&self) {
        self.lock_state().shut_down = true;
        self.available.notify_all();
        info!(target: LAMP_TARGET, "lamp arbiter shut down");
    }

    /// Runs the keep-alive of every waiter now instead of at its next tick.
    pub fn wake(&self) {
        let mut state = self.lock_state();
        state.wakes = state.wakes.wrapping_add(1);
        drop(state);
        self.available.notify_all();
        debug!(target: LAMP_TARGET, "lamp waiters woken");
    }

    /// Active light-set and holder count.
    ///
    /// A hold on the dark unit is labelled [`NO_LAMP_LABEL`], so the label is
    /// absent exactly when nobody holds the unit.
    #[must_use]
    pub fn snapshot(&self) -> LampStatus {
        let state = self.lock_state();
        let label = state.active.as_ref().map(|request| match request {
            LampRequest::NoLamp => LampLabel::new(NO_LAMP_LABEL),
            LampRequest::Lamps(label) => label.clone(),
        });
        LampStatus {
            label,
            holders: state.holders,
        }
    }

    /// Number of current holders.
    #[must_use]
    pub fn holders(&self) -> usize {
        self.lock_state().holders
    }

    /// Request currently holding the unit.
    #[must_use]
    pub fn active(&self) -> Option<LampRequest> {
        self.lock_state().active.clone()
    }

    /// Warm-up time for `label`, used in acknowledgement estimates.
    ///
    /// # Errors
    ///
    /// Returns the driver's error.
    pub fn warm_up(&self, label: &LampLabel) -> Result<Duration, CollaboratorError> {
        self.driver.warm_up(label)
    }
}

/// One hold on the lamp unit. Dropping it releases the hold.
#[derive(Debug)]
pub struct LampGuard<'a> {
    arbiter: &'a LampArbiter,
    request: LampRequest,
    released: bool,
}

impl LampGuard<'_> {
    /// What this hold requested.
    #[must_use]
    pub const fn request(&self) -> &LampRequest {
        &self.request
    }

    /// Releases the hold, reporting a failure to switch the unit off.
    ///
    /// # Errors
    ///
    /// Returns [`LampError::Unit`] when the final `all_off` fails.
    pub fn release(mut self) -> Result<(), LampError> {
        self.released = true;
        self.arbiter.release_hold(&self.request)
    }
}

impl Drop for LampGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(error) = self.arbiter.release_hold(&self.request) {
            warn!(
                target: LAMP_TARGET,
                request = %self.request,
                %error,
                "failed to switch lamp unit off on release"
            );
        }
    }
}

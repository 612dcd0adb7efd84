//! Per-connection protocol state machine.
//!
//! A session moves forward through `Received`, `Acknowledged`, `Executing`
//! and `Completed`. [`ProtocolSession::complete`] consumes the session, so a
//! command can never be completed twice.

use std::io::Write;
use std::time::Duration;

use frodo_protocol::{Arm, CommandId, Completion, ExposurePhase};
use tracing::{debug, trace, warn};

use crate::arms::ArmRegistration;
use crate::terminator::TerminationTrigger;

use super::DISPATCH_TARGET;
use super::errors::CommandFailure;
use super::response::{ResponseError, ResponseWriter};

/// Sub-state of a running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// Waiting for a shared resource.
    Acquiring,
    /// Blocked in a hardware call.
    HardwareOp,
    /// Waiting on the reduction pipeline.
    Reducing,
}

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Request decoded; nothing sent yet.
    Received,
    /// First acknowledgement sent.
    Acknowledged,
    /// Running command phases.
    Executing(ExecutionPhase),
    /// Completion sent.
    Completed,
}

impl ProtocolState {
    const fn rank(self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Acknowledged => 1,
            Self::Executing(_) => 2,
            Self::Completed => 3,
        }
    }
}

/// Progress reporting available to command executors.
pub trait ProgressSink {
    /// Sends an acknowledgement extending the client's timeout by `estimate`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandFailure::Transport`] when the client has gone away.
    fn acknowledge(&mut self, estimate: Duration) -> Result<(), CommandFailure>;

    /// Records entry into an execution phase.
    fn enter(&mut self, phase: ExecutionPhase);
}

/// Protocol session writing to one client.
#[derive(Debug)]
pub struct ProtocolSession<W> {
    id: CommandId,
    writer: ResponseWriter<W>,
    state: ProtocolState,
}

impl<W: Write> ProtocolSession<W> {
    /// Starts a session for command `id`.
    pub const fn new(id: CommandId, writer: ResponseWriter<W>) -> Self {
        Self {
            id,
            writer,
            state: ProtocolState::Received,
        }
    }

    /// Command being served.
    pub const fn id(&self) -> &CommandId {
        &self.id
    }

    /// Current state.
    pub const fn state(&self) -> ProtocolState {
        self.state
    }

    fn transition(&mut self, next: ProtocolState) {
        if next == self.state {
            return;
        }
        if next.rank() < self.state.rank()
            || (next.rank() == self.state.rank() && !matches!(next, ProtocolState::Executing(_)))
        {
            warn!(
                target: DISPATCH_TARGET,
                command = %self.id,
                from = ?self.state,
                to = ?next,
                "ignoring backward protocol transition"
            );
            return;
        }
        trace!(
            target: DISPATCH_TARGET,
            command = %self.id,
            from = ?self.state,
            to = ?next,
            "protocol transition"
        );
        self.state = next;
    }

    /// Sends an acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails. The caller decides whether the
    /// command can continue; the write is not retried.
    pub fn send_acknowledgement(&mut self, estimate: Duration) -> Result<(), ResponseError> {
        let millis = u64::try_from(estimate.as_millis()).unwrap_or(u64::MAX);
        self.writer.write_acknowledgement(&self.id, millis)?;
        if self.state == ProtocolState::Received {
            self.transition(ProtocolState::Acknowledged);
        }
        debug!(
            target: DISPATCH_TARGET,
            command = %self.id,
            time_to_complete_ms = millis,
            "acknowledgement sent"
        );
        Ok(())
    }

    /// Sends the completion, ending the session.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub fn complete(mut self, completion: Completion) -> Result<(), ResponseError> {
        self.transition(ProtocolState::Completed);
        self.writer.write_completion(completion)
    }
}

impl<W: Write> ProgressSink for ProtocolSession<W> {
    fn acknowledge(&mut self, estimate: Duration) -> Result<(), CommandFailure> {
        self.send_acknowledgement(estimate)
            .map_err(|error| CommandFailure::Transport {
                message: error.to_string(),
            })
    }

    fn enter(&mut self, phase: ExecutionPhase) {
        self.transition(ProtocolState::Executing(phase));
    }
}

/// What an executor sees of the connection running it.
pub struct Execution<'a> {
    progress: &'a mut dyn ProgressSink,
    registration: Option<&'a ArmRegistration<'a>>,
    termination: Option<TerminationTrigger>,
}

impl<'a> Execution<'a> {
    /// Wraps a progress sink and the arm registration, if any.
    pub fn new(
        progress: &'a mut dyn ProgressSink,
        registration: Option<&'a ArmRegistration<'a>>,
    ) -> Self {
        Self {
            progress,
            registration,
            termination: None,
        }
    }

    /// Sends an acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`CommandFailure::Transport`] when the client has gone away.
    pub fn acknowledge(&mut self, estimate: Duration) -> Result<(), CommandFailure> {
        self.progress.acknowledge(estimate)
    }

    /// Records entry into an execution phase.
    pub fn enter(&mut self, phase: ExecutionPhase) {
        self.progress.enter(phase);
    }

    /// Abort checkpoint for `arm`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandFailure::Aborted`] when an abort is pending.
    pub fn checkpoint(&self, arm: Arm) -> Result<(), CommandFailure> {
        match self.registration {
            Some(registration) => registration.checkpoint(arm).map_err(CommandFailure::from),
            None => Ok(()),
        }
    }

    /// Records the hardware phase of `arm` for status and abort handling.
    pub fn set_phase(&self, arm: Arm, phase: ExposurePhase) {
        if let Some(registration) = self.registration {
            registration.set_phase(arm, phase);
        }
    }

    /// Arranges for the process to terminate once the completion is sent.
    pub fn defer_termination(&mut self, trigger: TerminationTrigger) {
        self.termination = Some(trigger);
    }

    /// Takes the pending termination, if any.
    pub fn into_termination(self) -> Option<TerminationTrigger> {
        self.termination
    }
}

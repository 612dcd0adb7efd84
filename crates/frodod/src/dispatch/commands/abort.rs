//! `abort`: interrupt whatever owns the target arms.
//!
//! The abort raises each arm's flag so the owner stops at its next
//! checkpoint, then cancels whatever the hardware is doing, because an owner
//! blocked in a hardware call cannot poll its flag. Every step is attempted
//! even after a failure; the first failure decides the completion code.

use frodo_protocol::{AbortedArm, Arm, Command, CommandResult};
use tracing::{info, warn};

use crate::context::ServerContext;
use crate::dispatch::DISPATCH_TARGET;
use crate::dispatch::errors::{AbortStep, CommandFailure};
use crate::dispatch::session::{Execution, ExecutionPhase};
use crate::hardware::{CollaboratorError, ExposureStatus};

use super::CommandOutcome;

/// First failure seen while aborting.
#[derive(Default)]
struct FirstFailure(Option<CommandFailure>);

impl FirstFailure {
    fn record<T>(
        &mut self,
        step: AbortStep,
        arm: Option<Arm>,
        result: Result<T, CollaboratorError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(source) => {
                warn!(
                    target: DISPATCH_TARGET,
                    %step,
                    arm = ?arm,
                    error = %source,
                    "abort step failed"
                );
                if self.0.is_none() {
                    self.0 = Some(CommandFailure::abort_step(step, arm, source));
                }
                None
            }
        }
    }
}

pub(crate) fn execute(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    let arms = if command.arm.is_none() {
        &Arm::ALL[..]
    } else {
        command.arm.arms()
    };
    execution.enter(ExecutionPhase::HardwareOp);

    let hardware = context.hardware();
    let mut failure = FirstFailure::default();
    let mut motion_stopped = false;
    let mut aborted = Vec::with_capacity(arms.len());

    for &arm in arms {
        let owner = context.arms().request_abort(arm);
        if owner.is_some() {
            // An owner parked on the lamp unit re-checks its flag on wake.
            context.lamp().wake();
        }
        info!(
            target: DISPATCH_TARGET,
            command = %command.id,
            %arm,
            owner = ?owner.as_ref().map(|owner| owner.id.as_str()),
            "aborting arm"
        );

        let status = failure.record(AbortStep::StatusQuery, Some(arm), hardware.exposure_status(arm));
        if status == Some(ExposureStatus::Exposing) {
            failure.record(AbortStep::StopExposure, Some(arm), hardware.abort_exposure(arm));
        }

        let setup = failure.record(AbortStep::StatusQuery, Some(arm), hardware.setup_in_progress(arm));
        if setup == Some(true) {
            failure.record(AbortStep::AbortSetup, Some(arm), hardware.abort_setup(arm));
        }

        let resolution =
            failure.record(AbortStep::StatusQuery, Some(arm), hardware.grating_resolution(arm));
        if resolution == Some(0) && !motion_stopped {
            failure.record(AbortStep::AbortMotion, None, hardware.abort_grating_motion());
            motion_stopped = true;
        }

        let notify = owner.as_ref().map_or(&command.id, |owner| &owner.id);
        failure.record(
            AbortStep::PipelineNotify,
            Some(arm),
            context.pipeline().notify_abort(notify),
        );

        aborted.push(AbortedArm {
            arm,
            interrupted: owner.map(|owner| owner.id),
        });
    }

    match failure.0 {
        Some(error) => Err(error),
        None => Ok(Some(CommandResult::Abort { aborted })),
    }
}

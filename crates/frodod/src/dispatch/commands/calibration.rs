//! `master_calibration`: have the pipeline combine frames into a master.

use std::time::Duration;

use frodo_protocol::{Command, CommandPayload, CommandResult, ExposurePhase};
use tracing::info;

use crate::context::ServerContext;
use crate::dispatch::DISPATCH_TARGET;
use crate::dispatch::errors::CommandFailure;
use crate::dispatch::session::{Execution, ExecutionPhase};

use super::{CommandOutcome, payload_mismatch};

pub(crate) fn estimate(context: &ServerContext, _command: &Command) -> Duration {
    context.config().master_calibration_ack()
}

pub(crate) fn execute(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    let CommandPayload::MasterCalibration(payload) = &command.payload else {
        return Err(payload_mismatch(command));
    };
    let directory = payload
        .directory
        .as_deref()
        .or_else(|| context.config().master_calibration_directory())
        .ok_or_else(|| CommandFailure::configuration("master_calibration_directory is not set"))?;
    if directory.trim().is_empty() {
        return Err(CommandFailure::invalid_argument("calibration directory is empty"));
    }

    let arms = command.arm.arms();
    for &arm in arms {
        execution.checkpoint(arm)?;
        execution.set_phase(arm, ExposurePhase::Reducing);
    }
    execution.enter(ExecutionPhase::Reducing);
    info!(
        target: DISPATCH_TARGET,
        command = %command.id,
        kind = ?payload.kind,
        directory,
        "building master calibration"
    );
    let built = context
        .pipeline()
        .build_master_calibration(payload.kind, directory);
    for &arm in arms {
        execution.set_phase(arm, ExposurePhase::Idle);
        execution.checkpoint(arm)?;
    }
    let file = built.map_err(CommandFailure::Pipeline)?;
    Ok(Some(CommandResult::MasterCalibration {
        kind: payload.kind,
        file: file.into_string(),
    }))
}

//! `restart`: reinitialise in-process or hand over to the terminator.

use frodo_config::RestartPolicy;
use frodo_protocol::{Command, CommandPayload, CommandResult, RestartLevel};
use tracing::{info, warn};

use crate::context::ServerContext;
use crate::dispatch::DISPATCH_TARGET;
use crate::dispatch::errors::CommandFailure;
use crate::dispatch::session::{Execution, ExecutionPhase};

use super::{CommandOutcome, payload_mismatch};

const fn permitted(policy: RestartPolicy, level: RestartLevel) -> bool {
    match level {
        RestartLevel::Reinitialise => policy.reinitialise,
        RestartLevel::Software => policy.software,
        RestartLevel::Hardware => policy.hardware,
        RestartLevel::PowerOff => policy.power_off,
    }
}

pub(crate) fn execute(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    let CommandPayload::Restart(payload) = &command.payload else {
        return Err(payload_mismatch(command));
    };
    let level = payload.level;
    if !permitted(context.config().restart_policy(), level) {
        warn!(
            target: DISPATCH_TARGET,
            command = %command.id,
            %level,
            "restart level disabled; nothing done"
        );
        return Ok(Some(CommandResult::Restart {
            level,
            performed: false,
        }));
    }

    execution.enter(ExecutionPhase::HardwareOp);
    if level == RestartLevel::Reinitialise {
        context
            .hardware()
            .reinitialise()
            .map_err(CommandFailure::Hardware)?;
        info!(target: DISPATCH_TARGET, command = %command.id, "hardware reinitialised");
    } else {
        context
            .pipeline()
            .notify_restart(level)
            .map_err(CommandFailure::Pipeline)?;
        let trigger = context.terminator().schedule(level).map_err(|error| {
            CommandFailure::internal(format!("failed to schedule termination: {error}"))
        })?;
        execution.defer_termination(trigger);
    }
    Ok(Some(CommandResult::Restart {
        level,
        performed: true,
    }))
}

//! Estimators and executors for each command type.

mod abort;
mod calibration;
mod exposure;
mod restart;
mod status;

use std::time::Duration;

use frodo_protocol::{Arm, Command, CommandResult};

use crate::context::ServerContext;

use super::errors::CommandFailure;

pub(crate) use self::abort::execute as execute_abort;
pub(crate) use self::calibration::{
    estimate as estimate_master_calibration, execute as execute_master_calibration,
};
pub(crate) use self::exposure::{
    estimate_arc, estimate_bias, estimate_dark, estimate_expose, execute_arc, execute_bias,
    execute_dark, execute_expose,
};
pub(crate) use self::restart::execute as execute_restart;
pub(crate) use self::status::execute as execute_status;

/// Result of an executor.
pub(crate) type CommandOutcome = Result<Option<CommandResult>, CommandFailure>;

/// Estimate for commands with nothing better to go on.
pub(crate) fn estimate_default(context: &ServerContext, _command: &Command) -> Duration {
    context.config().default_ack()
}

/// Arms an arm-specific command drives.
fn required_arms(command: &Command) -> Result<&'static [Arm], CommandFailure> {
    let arms = command.arm.arms();
    if arms.is_empty() {
        return Err(CommandFailure::invalid_argument(format!(
            "{} needs a target arm",
            command.kind()
        )));
    }
    Ok(arms)
}

fn payload_mismatch(command: &Command) -> CommandFailure {
    CommandFailure::internal(format!(
        "payload for {} routed to the wrong executor",
        command.kind()
    ))
}

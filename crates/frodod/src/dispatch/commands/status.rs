//! `status`: arm phases and lamp unit state.

use frodo_protocol::{Command, CommandResult};

use crate::context::ServerContext;
use crate::dispatch::session::Execution;

use super::CommandOutcome;

pub(crate) fn execute(
    context: &ServerContext,
    _command: &Command,
    _execution: &mut Execution<'_>,
) -> CommandOutcome {
    Ok(Some(CommandResult::Status {
        arms: context.arms().snapshot(),
        lamp: context.lamp().snapshot(),
    }))
}

//! Static table of command types.
//!
//! Each entry names the estimator and executor for one command type, the
//! error family its failures report under, and whether it takes ownership of
//! its arms. Anything the table does not know resolves to the unknown entry,
//! whose failures are reported under the unknown family.

use std::time::Duration;

use frodo_protocol::{Command, CommandEnvelope, CommandKind, DecodeError};

use crate::context::ServerContext;

use super::commands::{
    self, CommandOutcome, estimate_arc, estimate_bias, estimate_dark, estimate_default,
    estimate_expose, estimate_master_calibration,
};
use super::errors::{CommandFailure, ErrorFamily, ProtocolError};
use super::session::Execution;

/// Scheduling class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Runs at normal priority.
    Ordinary,
    /// Interrupts other commands; its worker asks for elevated priority.
    Interrupt,
}

/// Produces the initial completion estimate.
pub(crate) type Estimator = fn(&ServerContext, &Command) -> Duration;

/// Runs a decoded command.
pub(crate) type Executor = fn(&ServerContext, &Command, &mut Execution<'_>) -> CommandOutcome;

/// One row of the command table.
pub(crate) struct CommandEntry {
    /// Command type this entry handles; `None` for the unknown entry.
    pub(crate) kind: Option<CommandKind>,
    /// Family its failure codes report under.
    pub(crate) family: ErrorFamily,
    /// Scheduling class.
    pub(crate) class: CommandClass,
    /// Whether the command registers as owner of its arms and honours aborts.
    pub(crate) abortable: bool,
    /// Initial estimate.
    pub(crate) estimate: Estimator,
    /// Executor.
    pub(crate) execute: Executor,
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CommandEntry")
            .field("kind", &self.kind)
            .field("family", &self.family)
            .field("class", &self.class)
            .field("abortable", &self.abortable)
            .finish_non_exhaustive()
    }
}

impl CommandEntry {
    const fn ordinary(
        kind: CommandKind,
        family: ErrorFamily,
        abortable: bool,
        estimate: Estimator,
        execute: Executor,
    ) -> Self {
        Self {
            kind: Some(kind),
            family,
            class: CommandClass::Ordinary,
            abortable,
            estimate,
            execute,
        }
    }

    /// Decodes the envelope's body for this entry.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] when the body does not fit, and
    /// always for the unknown entry.
    pub(crate) fn decode(&self, envelope: &CommandEnvelope) -> Result<Command, ProtocolError> {
        match self.kind {
            Some(kind) => envelope.decode(kind).map_err(ProtocolError::from),
            None => Err(envelope
                .kind()
                .err()
                .unwrap_or(DecodeError::MissingType)
                .into()),
        }
    }
}

fn reject(
    _context: &ServerContext,
    _command: &Command,
    _execution: &mut Execution<'_>,
) -> CommandOutcome {
    Err(CommandFailure::internal("no executor for unknown command"))
}

static ENTRIES: [CommandEntry; 8] = [
    CommandEntry::ordinary(
        CommandKind::Expose,
        ErrorFamily::Expose,
        true,
        estimate_expose,
        commands::execute_expose,
    ),
    CommandEntry::ordinary(
        CommandKind::Bias,
        ErrorFamily::Bias,
        true,
        estimate_bias,
        commands::execute_bias,
    ),
    CommandEntry::ordinary(
        CommandKind::Dark,
        ErrorFamily::Dark,
        true,
        estimate_dark,
        commands::execute_dark,
    ),
    CommandEntry::ordinary(
        CommandKind::Arc,
        ErrorFamily::Arc,
        true,
        estimate_arc,
        commands::execute_arc,
    ),
    CommandEntry::ordinary(
        CommandKind::MasterCalibration,
        ErrorFamily::MasterCalibration,
        true,
        estimate_master_calibration,
        commands::execute_master_calibration,
    ),
    CommandEntry::ordinary(
        CommandKind::Status,
        ErrorFamily::Status,
        false,
        estimate_default,
        commands::execute_status,
    ),
    CommandEntry::ordinary(
        CommandKind::Restart,
        ErrorFamily::Restart,
        false,
        estimate_default,
        commands::execute_restart,
    ),
    CommandEntry {
        kind: Some(CommandKind::Abort),
        family: ErrorFamily::Abort,
        class: CommandClass::Interrupt,
        abortable: false,
        estimate: estimate_default,
        execute: commands::execute_abort,
    },
];

static UNKNOWN: CommandEntry = CommandEntry {
    kind: None,
    family: ErrorFamily::Unknown,
    class: CommandClass::Ordinary,
    abortable: false,
    estimate: estimate_default,
    execute: reject,
};

/// Looks up the entry for a type tag; unknown or missing tags resolve to the
/// unknown entry.
pub(crate) fn lookup(tag: Option<&str>) -> &'static CommandEntry {
    tag.and_then(CommandKind::from_tag)
        .and_then(|kind| ENTRIES.iter().find(|entry| entry.kind == Some(kind)))
        .unwrap_or(&UNKNOWN)
}

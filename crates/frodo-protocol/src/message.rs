//! Outbound messages written by the daemon.

use serde::{Deserialize, Serialize};

use crate::arm::{Arm, ExposurePhase};
use crate::command::{CalibrationKind, CommandId, LampLabel, RestartLevel};

/// One line written back to the client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Keep-alive carrying an updated estimate of time to completion.
    Acknowledgement {
        /// Command being acknowledged.
        id: CommandId,
        /// Milliseconds the client should wait before giving up.
        time_to_complete_ms: u64,
    },
    /// Final outcome; always the last line on a connection.
    Completion(Completion),
}

impl ServerMessage {
    /// Builds an acknowledgement.
    #[must_use]
    pub const fn acknowledgement(id: CommandId, time_to_complete_ms: u64) -> Self {
        Self::Acknowledgement {
            id,
            time_to_complete_ms,
        }
    }

    /// True for the terminal completion message.
    #[must_use]
    pub const fn is_completion(&self) -> bool {
        matches!(self, Self::Completion(_))
    }
}

impl From<Completion> for ServerMessage {
    fn from(completion: Completion) -> Self {
        Self::Completion(completion)
    }
}

/// Terminal result of a command.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Completion {
    /// Command being completed; empty when the request could not be parsed.
    pub id: CommandId,
    /// Whether the command succeeded.
    pub successful: bool,
    /// Zero on success, otherwise `base + family + specific`.
    pub error_code: i32,
    /// Human-readable failure description; empty on success.
    pub error_message: String,
    /// Command-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
}

impl Completion {
    /// Successful completion with an optional result payload.
    #[must_use]
    pub const fn success(id: CommandId, result: Option<CommandResult>) -> Self {
        Self {
            id,
            successful: true,
            error_code: 0,
            error_message: String::new(),
            result,
        }
    }

    /// Failed completion.
    #[must_use]
    pub fn failure(id: CommandId, error_code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            successful: false,
            error_code,
            error_message: message.into(),
            result: None,
        }
    }

    /// Attaches a result to a failure, used by partial outcomes such as abort.
    #[must_use]
    pub fn with_result(mut self, result: CommandResult) -> Self {
        self.result = Some(result);
        self
    }
}

/// Command-specific completion payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    /// Output of exposure-producing commands.
    Exposure {
        /// Files written, in acquisition order.
        files: Vec<String>,
        /// Mean counts of the last reduced frame.
        mean_counts: f64,
        /// Peak counts of the last reduced frame.
        peak_counts: f64,
    },
    /// Output of a master calibration build.
    MasterCalibration {
        /// Kind built.
        kind: CalibrationKind,
        /// Master frame produced by the pipeline.
        file: String,
    },
    /// Controller state snapshot.
    Status {
        /// One entry per arm, red first.
        arms: Vec<ArmStatus>,
        /// Shared lamp unit state.
        lamp: LampStatus,
    },
    /// Outcome of an abort.
    Abort {
        /// Arms the abort was applied to.
        aborted: Vec<AbortedArm>,
    },
    /// Restart accepted.
    Restart {
        /// Requested level.
        level: RestartLevel,
        /// False when the level is disabled by configuration.
        performed: bool,
    },
}

/// Status of one arm.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArmStatus {
    /// The arm.
    pub arm: Arm,
    /// Last phase recorded by its owner.
    pub phase: ExposurePhase,
    /// Command currently owning the arm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<CommandId>,
}

/// Status of the shared lamp unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LampStatus {
    /// Active light-set; `"none"` while held dark and absent while idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LampLabel>,
    /// Number of workers holding the lock.
    pub holders: usize,
}

/// One arm touched by an abort command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AbortedArm {
    /// The arm.
    pub arm: Arm,
    /// Command that was interrupted, if any owned the arm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<CommandId>,
}

//! Error types for command execution and the completion codes they map to.
//!
//! A completion error code is `base + family + specific`. The base comes from
//! configuration, the family from the command's registry entry, and the
//! specific code from the failure itself. Lamp, abort and protocol failures
//! carry their own family because they mean the same thing whichever command
//! raised them.

use std::fmt;
use std::io;

use frodo_protocol::{Arm, DecodeError};
use thiserror::Error;

use crate::arms::Aborted;
use crate::hardware::CollaboratorError;
use crate::lamp::LampError;

/// Completion code family of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    /// Unknown or malformed commands.
    Unknown,
    /// Lamp unit acquisition.
    Lamp,
    /// `bias`.
    Bias,
    /// `dark`.
    Dark,
    /// `status`.
    Status,
    /// `expose`.
    Expose,
    /// `restart`.
    Restart,
    /// `arc`.
    Arc,
    /// `master_calibration`.
    MasterCalibration,
    /// `abort`.
    Abort,
}

impl ErrorFamily {
    /// Offset added to the configured base.
    #[must_use]
    pub const fn offset(self) -> i32 {
        match self {
            Self::Unknown => 400,
            Self::Lamp => 500,
            Self::Bias => 700,
            Self::Dark => 900,
            Self::Status => 1100,
            Self::Expose => 1200,
            Self::Restart => 1400,
            Self::Arc => 1500,
            Self::MasterCalibration => 1700,
            Self::Abort => 2400,
        }
    }
}

/// Request-level failures detected before a command runs.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request could not be decoded into a known command.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The request line exceeded the size limit.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
    /// Reading the request failed.
    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),
}

impl ProtocolError {
    /// Completion code for any protocol failure.
    #[must_use]
    pub const fn error_code(&self, base: i32) -> i32 {
        base.saturating_add(ErrorFamily::Unknown.offset())
    }
}

/// Forceful abort step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortStep {
    /// Stopping an exposure.
    StopExposure,
    /// Abandoning detector or grating setup.
    AbortSetup,
    /// Stopping grating motion.
    AbortMotion,
    /// Telling the pipeline to drop the command's reduction.
    PipelineNotify,
    /// Querying hardware state.
    StatusQuery,
}

impl fmt::Display for AbortStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::StopExposure => "stop exposure",
            Self::AbortSetup => "abort setup",
            Self::AbortMotion => "abort grating motion",
            Self::PipelineNotify => "notify pipeline of abort",
            Self::StatusQuery => "query hardware state",
        })
    }
}

impl AbortStep {
    const fn code(self) -> i32 {
        match self {
            Self::StopExposure => 1,
            Self::AbortSetup => 2,
            Self::AbortMotion => 3,
            Self::PipelineNotify => 4,
            Self::StatusQuery => 5,
        }
    }
}

/// Failure of a command executor.
#[derive(Debug, Error)]
pub enum CommandFailure {
    /// A required setting is missing.
    #[error("configuration missing: {message}")]
    Configuration {
        /// What is missing.
        message: String,
    },
    /// The hardware reported a failure.
    #[error(transparent)]
    Hardware(CollaboratorError),
    /// The command was aborted.
    #[error("{0}")]
    Aborted(#[from] Aborted),
    /// The reduction pipeline reported a failure.
    #[error(transparent)]
    Pipeline(CollaboratorError),
    /// The payload is not usable.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What is wrong.
        message: String,
    },
    /// An output artefact could not be allocated or written.
    #[error(transparent)]
    Artefact(CollaboratorError),
    /// The lamp unit could not be acquired.
    #[error(transparent)]
    Lamp(#[from] LampError),
    /// A forceful abort step failed.
    #[error("failed to {step}: {source}")]
    Abort {
        /// Step that failed first.
        step: AbortStep,
        /// Arm being aborted, if the step was arm-specific.
        arm: Option<Arm>,
        /// Collaborator error.
        #[source]
        source: CollaboratorError,
    },
    /// The client connection failed mid-command.
    #[error("client connection lost: {message}")]
    Transport {
        /// Transport error text.
        message: String,
    },
    /// An invariant of the daemon itself failed.
    #[error("internal error: {message}")]
    Internal {
        /// What failed.
        message: String,
    },
}

impl CommandFailure {
    /// Creates a configuration failure.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid-argument failure.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an abort-step failure.
    pub const fn abort_step(step: AbortStep, arm: Option<Arm>, source: CollaboratorError) -> Self {
        Self::Abort { step, arm, source }
    }

    /// Whether this failure reports a successful abort of the command.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Completion code for this failure raised by a command of `family`.
    ///
    /// Saturates rather than wrapping when the base sits near an `i32` limit.
    #[must_use]
    pub const fn error_code(&self, base: i32, family: ErrorFamily) -> i32 {
        let (family, specific) = match self {
            Self::Configuration { .. } => (family, 1),
            Self::Hardware(_) => (family, 2),
            Self::Aborted(_) => (family, 3),
            Self::Pipeline(_) => (family, 4),
            Self::InvalidArgument { .. } => (family, 5),
            Self::Artefact(_) => (family, 6),
            Self::Transport { .. } | Self::Internal { .. } => (family, 9),
            Self::Lamp(error) => (
                ErrorFamily::Lamp,
                match error {
                    LampError::WaitInterrupted { .. } => 1,
                    LampError::Unit { .. } => 2,
                    LampError::Poisoned => 9,
                },
            ),
            Self::Abort { step, .. } => (ErrorFamily::Abort, step.code()),
        };
        base.saturating_add(family.offset()).saturating_add(specific)
    }
}

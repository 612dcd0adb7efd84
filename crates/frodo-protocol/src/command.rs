//! Inbound command schema.
//!
//! Decoding happens in two steps so the daemon can always answer with the
//! client's command id: the envelope is parsed first, with the command body
//! left as raw JSON, then [`CommandEnvelope::decode`] turns the body into a
//! typed [`CommandPayload`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::arm::ArmSelector;

/// Client-chosen identifier echoed on every response line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    /// Wraps an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Name of a calibration light-set, such as `Xe` or `W`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LampLabel(String);

impl LampLabel {
    /// Wraps a light-set name.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Light-set name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for LampLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Closed set of command types understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Unilluminated science exposures.
    Expose,
    /// Zero-length bias readout.
    Bias,
    /// Timed dark frame.
    Dark,
    /// Arc-lamp calibration exposure.
    Arc,
    /// Build a master calibration frame in the pipeline.
    MasterCalibration,
    /// Report arm and lamp state.
    Status,
    /// Reinitialise or restart the controller.
    Restart,
    /// Interrupt whatever owns the target arm(s).
    Abort,
}

impl CommandKind {
    /// Every command kind.
    pub const ALL: [Self; 8] = [
        Self::Expose,
        Self::Bias,
        Self::Dark,
        Self::Arc,
        Self::MasterCalibration,
        Self::Status,
        Self::Restart,
        Self::Abort,
    ];

    /// Wire tag for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expose => "expose",
            Self::Bias => "bias",
            Self::Dark => "dark",
            Self::Arc => "arc",
            Self::MasterCalibration => "master_calibration",
            Self::Status => "status",
            Self::Restart => "restart",
            Self::Abort => "abort",
        }
    }

    /// Looks up a kind by wire tag (case-insensitive).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(tag.trim()))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Severity of a `restart` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartLevel {
    /// Reinitialise hardware connections without leaving the process.
    Reinitialise,
    /// Exit so the service manager restarts the daemon.
    Software,
    /// Reboot the controller host.
    Hardware,
    /// Power the controller host off.
    PowerOff,
}

impl fmt::Display for RestartLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Reinitialise => "reinitialise",
            Self::Software => "software",
            Self::Hardware => "hardware",
            Self::PowerOff => "power_off",
        })
    }
}

/// Kind of master calibration frame the pipeline should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationKind {
    /// Master bias.
    Bias,
    /// Master dark.
    Dark,
    /// Master flat field.
    Flat,
}

/// Science exposure run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExposePayload {
    /// Length of each exposure in milliseconds.
    pub exposure_ms: u64,
    /// Number of frames to take.
    #[serde(default = "one")]
    pub count: u32,
}

/// Timed dark frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DarkPayload {
    /// Integration time in milliseconds.
    pub exposure_ms: u64,
}

/// Arc-lamp calibration exposure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArcPayload {
    /// Light-set to energise.
    pub lamp: LampLabel,
    /// Exposure length in milliseconds.
    pub exposure_ms: u64,
}

/// Master calibration build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MasterCalibrationPayload {
    /// Which master frame to build.
    pub kind: CalibrationKind,
    /// Directory of input frames; the configured default when absent.
    #[serde(default)]
    pub directory: Option<String>,
}

/// Controller restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RestartPayload {
    /// Requested severity.
    pub level: RestartLevel,
}

/// Typed command body, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    /// See [`ExposePayload`].
    Expose(ExposePayload),
    /// Bias readout; no parameters.
    Bias,
    /// See [`DarkPayload`].
    Dark(DarkPayload),
    /// See [`ArcPayload`].
    Arc(ArcPayload),
    /// See [`MasterCalibrationPayload`].
    MasterCalibration(MasterCalibrationPayload),
    /// Status query; no parameters.
    Status,
    /// See [`RestartPayload`].
    Restart(RestartPayload),
    /// Abort; no parameters.
    Abort,
}

impl CommandPayload {
    /// Kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Expose(_) => CommandKind::Expose,
            Self::Bias => CommandKind::Bias,
            Self::Dark(_) => CommandKind::Dark,
            Self::Arc(_) => CommandKind::Arc,
            Self::MasterCalibration(_) => CommandKind::MasterCalibration,
            Self::Status => CommandKind::Status,
            Self::Restart(_) => CommandKind::Restart,
            Self::Abort => CommandKind::Abort,
        }
    }
}

/// A decoded, immutable command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    /// Client identifier.
    pub id: CommandId,
    /// Target arm(s).
    pub arm: ArmSelector,
    /// Typed body.
    pub payload: CommandPayload,
}

impl Command {
    /// Builds a command.
    #[must_use]
    pub fn new(id: CommandId, arm: ArmSelector, payload: CommandPayload) -> Self {
        Self { id, arm, payload }
    }

    /// Kind of the command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        self.payload.kind()
    }
}

/// Raw inbound message with the command body still undecoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandEnvelope {
    /// Client identifier.
    #[serde(default)]
    pub id: CommandId,
    /// Target arm(s).
    #[serde(default)]
    pub arm: ArmSelector,
    /// Command body; must be an object with a `type` field.
    pub command: Value,
}

/// Reasons a request could not be turned into a [`Command`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The line is not a JSON envelope.
    #[error("malformed request: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The line was empty.
    #[error("empty request line")]
    Empty,
    /// The command body has no string `type` field.
    #[error("command has no type tag")]
    MissingType,
    /// The `type` tag names no known command.
    #[error("unknown command type '{0}'")]
    UnknownType(String),
    /// The body does not match the schema of its declared type.
    #[error("command body does not match type '{kind}': {source}")]
    Mismatch {
        /// Declared kind.
        kind: CommandKind,
        /// Schema error.
        #[source]
        source: serde_json::Error,
    },
}

impl CommandEnvelope {
    /// Parses one request line, ignoring trailing whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Empty`] for a blank line and
    /// [`DecodeError::Malformed`] when the line is not an envelope.
    pub fn parse(line: &[u8]) -> Result<Self, DecodeError> {
        let end = line
            .iter()
            .rposition(|byte| !byte.is_ascii_whitespace())
            .map_or(0, |pos| pos + 1);
        let trimmed = line.get(..end).unwrap_or_default();
        if trimmed.is_empty() {
            return Err(DecodeError::Empty);
        }
        serde_json::from_slice(trimmed).map_err(DecodeError::Malformed)
    }

    /// The body's `type` tag, if present.
    #[must_use]
    pub fn type_tag(&self) -> Option<&str> {
        self.command.get("type").and_then(Value::as_str)
    }

    /// Declared kind of the command.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingType`] or [`DecodeError::UnknownType`].
    pub fn kind(&self) -> Result<CommandKind, DecodeError> {
        let tag = self.type_tag().ok_or(DecodeError::MissingType)?;
        CommandKind::from_tag(tag).ok_or_else(|| DecodeError::UnknownType(tag.to_owned()))
    }

    /// Decodes the body against the schema for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Mismatch`] when the body does not fit the
    /// declared kind's schema.
    pub fn decode(&self, kind: CommandKind) -> Result<Command, DecodeError> {
        let mut body = self.command.clone();
        if let Some(object) = body.as_object_mut() {
            object.insert(String::from("type"), Value::from(kind.as_str()));
        }
        let payload: CommandPayload = serde_json::from_value(body)
            .map_err(|source| DecodeError::Mismatch { kind, source })?;
        Ok(Command::new(self.id.clone(), self.arm, payload))
    }
}

const fn one() -> u32 {
    1
}

//! Wire types exchanged between the FRODO daemon and its clients.
//!
//! Each connection carries exactly one [`CommandEnvelope`] from the client,
//! then zero or more [`ServerMessage::Acknowledgement`] lines and exactly one
//! [`ServerMessage::Completion`] line from the daemon. All messages are JSON
//! objects framed one per line.

mod arm;
mod command;
mod message;

pub use arm::{Arm, ArmSelector, ExposurePhase};
pub use command::{
    ArcPayload, CalibrationKind, Command, CommandEnvelope, CommandId, CommandKind, CommandPayload,
    DarkPayload, DecodeError, ExposePayload, LampLabel, MasterCalibrationPayload, RestartLevel,
    RestartPayload,
};
pub use message::{
    AbortedArm, ArmStatus, CommandResult, Completion, LampStatus, ServerMessage,
};

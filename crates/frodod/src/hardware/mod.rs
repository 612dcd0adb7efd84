//! Collaborator interfaces the command core drives.
//!
//! Every call is blocking and may take as long as the hardware needs. The
//! only way to stop a call that is already in progress is to invoke one of
//! the forceful `abort_*` operations from another thread; the blocked call
//! then returns an error.

mod simulated;

use std::fmt;
use std::time::Duration;

use frodo_protocol::{Arm, CalibrationKind, CommandId, LampLabel, RestartLevel};
use thiserror::Error;

pub use self::simulated::{
    CountingFileAllocator, SimulatedHardware, SimulatedLampUnit, SimulatedMetadata,
    SimulatedPipeline,
};

/// Failure reported by a collaborator, surfaced verbatim to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct CollaboratorError {
    /// Operation that failed, such as `start_exposure`.
    pub operation: &'static str,
    /// Native failure description.
    pub message: String,
}

impl CollaboratorError {
    /// Builds an error for `operation`.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Identifier of an allocated output artefact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(String);

impl FileId {
    /// Wraps an artefact name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Artefact name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the name.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Kind of frame being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureKind {
    /// Unilluminated science frame.
    Science,
    /// Zero-length readout.
    Bias,
    /// Timed frame with the shutter closed.
    Dark,
    /// Calibration frame lit by a lamp light-set.
    Arc,
}

impl ExposureKind {
    /// Single-letter code used in artefact names.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Science => 'e',
            Self::Bias => 'b',
            Self::Dark => 'd',
            Self::Arc => 'a',
        }
    }
}

/// What the detector reports it is doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExposureStatus {
    /// No exposure in progress.
    #[default]
    Idle,
    /// Shutter open or detector integrating.
    Exposing,
    /// Detector being read out.
    Readout,
}

/// Parameters for a timed exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureRequest {
    /// Artefact the frame is written to.
    pub file: FileId,
    /// Frame kind.
    pub kind: ExposureKind,
    /// Integration time.
    pub duration: Duration,
}

/// Header inputs for a completed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureMetadata {
    /// Command that produced the frame.
    pub command: CommandId,
    /// Frame kind.
    pub kind: ExposureKind,
    /// Integration time.
    pub duration: Duration,
    /// Light-set lit during the exposure, if any.
    pub lamp: Option<LampLabel>,
}

/// Statistics returned by the reduction pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionOutput {
    /// Reduced artefact.
    pub file: FileId,
    /// Mean counts over the frame.
    pub mean_counts: f64,
    /// Peak counts over the frame.
    pub peak_counts: f64,
}

/// Detector, shutter and grating control for both arms.
#[cfg_attr(test, mockall::automock)]
pub trait HardwareFacade: Send + Sync {
    /// Current detector activity.
    fn exposure_status(&self, arm: Arm) -> Result<ExposureStatus, CollaboratorError>;

    /// Runs a timed exposure, blocking until the frame is read out.
    fn start_exposure(&self, arm: Arm, request: &ExposureRequest) -> Result<(), CollaboratorError>;

    /// Reads out a bias frame.
    fn bias(&self, arm: Arm, file: &FileId) -> Result<(), CollaboratorError>;

    /// Forcefully stops an exposure in progress.
    fn abort_exposure(&self, arm: Arm) -> Result<(), CollaboratorError>;

    /// Whether detector or grating setup is running.
    fn setup_in_progress(&self, arm: Arm) -> Result<bool, CollaboratorError>;

    /// Forcefully abandons setup.
    fn abort_setup(&self, arm: Arm) -> Result<(), CollaboratorError>;

    /// Grating resolution; zero while the position is unknown or in transit.
    fn grating_resolution(&self, arm: Arm) -> Result<u32, CollaboratorError>;

    /// Stops all grating motion. The field bus cannot address a single arm.
    fn abort_grating_motion(&self) -> Result<(), CollaboratorError>;

    /// Reopens every hardware connection.
    fn reinitialise(&self) -> Result<(), CollaboratorError>;
}

/// The shared calibration lamp unit.
#[cfg_attr(test, mockall::automock)]
pub trait LampUnitDriver: Send + Sync {
    /// Switches every lamp off.
    fn all_off(&self) -> Result<(), CollaboratorError>;

    /// Switches on the lamps making up `label`.
    fn turn_on(&self, label: &LampLabel) -> Result<(), CollaboratorError>;

    /// Time `label` needs before its output is stable.
    fn warm_up(&self, label: &LampLabel) -> Result<Duration, CollaboratorError>;
}

/// Downstream reduction pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait PipelineClient: Send + Sync {
    /// Reduces a raw frame.
    fn reduce(&self, file: &FileId) -> Result<ReductionOutput, CollaboratorError>;

    /// Cancels any reduction belonging to `command`.
    fn notify_abort(&self, command: &CommandId) -> Result<(), CollaboratorError>;

    /// Combines the frames in `directory` into a master frame.
    fn build_master_calibration(
        &self,
        kind: CalibrationKind,
        directory: &str,
    ) -> Result<FileId, CollaboratorError>;

    /// Warns the pipeline that the controller is about to restart.
    fn notify_restart(&self, level: RestartLevel) -> Result<(), CollaboratorError>;
}

/// Writes frame headers.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataAssembler: Send + Sync {
    /// Embeds `metadata` into the artefact `file`.
    fn assemble(
        &self,
        arm: Arm,
        file: &FileId,
        metadata: &ExposureMetadata,
    ) -> Result<(), CollaboratorError>;
}

/// Chooses output artefact names.
#[cfg_attr(test, mockall::automock)]
pub trait FileAllocator: Send + Sync {
    /// Reserves the next artefact for `arm`.
    fn allocate(&self, arm: Arm, kind: ExposureKind) -> Result<FileId, CollaboratorError>;
}

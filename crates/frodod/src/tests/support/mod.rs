//! Shared doubles and fixtures for the daemon's unit and behaviour tests.

mod bench;
mod config_loader;
mod doubles;
mod reporter;

pub(crate) use bench::{TestBench, TestCollaborators, test_collaborators, test_config};
pub(crate) use config_loader::{FailingConfigLoader, TestConfigLoader};
pub(crate) use doubles::{
    HardwareCall, LampCall, NullProgress, PipelineCall, RecordingHardware, RecordingHostControl,
    RecordingLampUnit, RecordingPipeline, RecordingProcessExit, TestShutdownSignal,
};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};

//! A server context wired to recording collaborators.

use std::sync::Arc;

use frodo_config::Config;

use crate::context::{Collaborators, ServerContext};
use crate::hardware::{CountingFileAllocator, SimulatedMetadata};

use super::doubles::{
    RecordingHardware, RecordingHostControl, RecordingLampUnit, RecordingPipeline,
    RecordingProcessExit,
};

/// Configuration with short waits suitable for tests.
pub(crate) fn test_config() -> Config {
    Config {
        default_ack_ms: 1_000,
        lamp_wait_interval_ms: 20,
        master_calibration_ack_ms: 5_000,
        ..Config::default()
    }
}

/// Recording collaborators, before they are handed to a context.
pub(crate) struct TestCollaborators {
    pub(crate) collaborators: Collaborators,
    pub(crate) hardware: Arc<RecordingHardware>,
    pub(crate) lamp_unit: Arc<RecordingLampUnit>,
    pub(crate) pipeline: Arc<RecordingPipeline>,
    pub(crate) host: Arc<RecordingHostControl>,
    pub(crate) exit: Arc<RecordingProcessExit>,
}

impl TestCollaborators {
    pub(crate) fn into_bench(self) -> TestBench {
        self.into_bench_with(test_config())
    }

    pub(crate) fn into_bench_with(self, config: Config) -> TestBench {
        TestBench {
            context: ServerContext::new(config, self.collaborators),
            hardware: self.hardware,
            lamp_unit: self.lamp_unit,
            pipeline: self.pipeline,
            host: self.host,
            exit: self.exit,
        }
    }
}

/// Builds a fresh set of recording collaborators.
pub(crate) fn test_collaborators() -> TestCollaborators {
    let hardware = Arc::new(RecordingHardware::default());
    let lamp_unit = Arc::new(RecordingLampUnit::default());
    let pipeline = Arc::new(RecordingPipeline::default());
    let host = Arc::new(RecordingHostControl::default());
    let exit = Arc::new(RecordingProcessExit::default());
    let collaborators = Collaborators {
        hardware: hardware.clone(),
        lamp_unit: lamp_unit.clone(),
        pipeline: pipeline.clone(),
        metadata: Arc::new(SimulatedMetadata),
        files: Arc::new(CountingFileAllocator::new()),
        host: host.clone(),
        exit: exit.clone(),
    };
    TestCollaborators {
        collaborators,
        hardware,
        lamp_unit,
        pipeline,
        host,
        exit,
    }
}

/// Context plus handles on its recording collaborators.
pub(crate) struct TestBench {
    pub(crate) context: ServerContext,
    pub(crate) hardware: Arc<RecordingHardware>,
    pub(crate) lamp_unit: Arc<RecordingLampUnit>,
    pub(crate) pipeline: Arc<RecordingPipeline>,
    pub(crate) host: Arc<RecordingHostControl>,
    pub(crate) exit: Arc<RecordingProcessExit>,
}

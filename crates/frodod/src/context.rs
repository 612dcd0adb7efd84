//! Shared state handed to every connection worker.

use std::sync::Arc;

use frodo_config::Config;

use crate::arms::ArmRegistry;
use crate::hardware::{
    CountingFileAllocator, FileAllocator, HardwareFacade, LampUnitDriver, MetadataAssembler,
    PipelineClient, SimulatedHardware, SimulatedLampUnit, SimulatedMetadata, SimulatedPipeline,
};
use crate::lamp::LampArbiter;
use crate::terminator::{
    HostControl, ProcessExit, SystemHostControl, SystemProcessExit, Terminator,
};

/// External systems the command core drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Detector, shutter and grating control.
    pub hardware: Arc<dyn HardwareFacade>,
    /// Shared calibration lamp unit.
    pub lamp_unit: Arc<dyn LampUnitDriver>,
    /// Reduction pipeline.
    pub pipeline: Arc<dyn PipelineClient>,
    /// Header writer.
    pub metadata: Arc<dyn MetadataAssembler>,
    /// Output artefact naming.
    pub files: Arc<dyn FileAllocator>,
    /// Host reboot and power-off.
    pub host: Arc<dyn HostControl>,
    /// Process exit.
    pub exit: Arc<dyn ProcessExit>,
}

impl Collaborators {
    /// Bench collaborators: simulated instrument, real process exit.
    #[must_use]
    pub fn simulated() -> Self {
        Self {
            hardware: Arc::new(SimulatedHardware::new()),
            lamp_unit: Arc::new(SimulatedLampUnit::new()),
            pipeline: Arc::new(SimulatedPipeline),
            metadata: Arc::new(SimulatedMetadata),
            files: Arc::new(CountingFileAllocator::new()),
            host: Arc::new(SystemHostControl),
            exit: Arc::new(SystemProcessExit),
        }
    }
}

/// Process-wide state: configuration, arm registry, lamp arbiter and
/// collaborators. Created once at startup.
pub struct ServerContext {
    config: Config,
    arms: ArmRegistry,
    lamp: LampArbiter,
    terminator: Terminator,
    collaborators: Collaborators,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServerContext")
            .field("arms", &self.arms)
            .field("lamp", &self.lamp)
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    /// Builds the context from configuration and collaborators.
    #[must_use]
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let lamp = LampArbiter::new(
            Arc::clone(&collaborators.lamp_unit),
            config.lamp_wait_interval(),
        );
        let terminator = Terminator::new(
            Arc::clone(&collaborators.host),
            Arc::clone(&collaborators.exit),
        );
        Self {
            config,
            arms: ArmRegistry::new(),
            lamp,
            terminator,
            collaborators,
        }
    }

    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Arm ownership registry.
    #[must_use]
    pub const fn arms(&self) -> &ArmRegistry {
        &self.arms
    }

    /// Lamp unit arbiter.
    #[must_use]
    pub const fn lamp(&self) -> &LampArbiter {
        &self.lamp
    }

    /// Deferred process exit.
    #[must_use]
    pub const fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    /// Hardware collaborator.
    #[must_use]
    pub fn hardware(&self) -> &dyn HardwareFacade {
        self.collaborators.hardware.as_ref()
    }

    /// Pipeline collaborator.
    #[must_use]
    pub fn pipeline(&self) -> &dyn PipelineClient {
        self.collaborators.pipeline.as_ref()
    }

    /// Header writer.
    #[must_use]
    pub fn metadata(&self) -> &dyn MetadataAssembler {
        self.collaborators.metadata.as_ref()
    }

    /// Output artefact allocator.
    #[must_use]
    pub fn files(&self) -> &dyn FileAllocator {
        self.collaborators.files.as_ref()
    }

    /// Stops accepting lamp waits; used during shutdown.
    pub fn shutdown(&self) {
        self.lamp.shutdown();
    }
}

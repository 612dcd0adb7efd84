//! Bench collaborators for running the daemon without instrument hardware.
//!
//! Exposures sleep for their requested duration and honour
//! [`HardwareFacade::abort_exposure`] from another thread, so the abort path
//! behaves as it does on the real detector.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use frodo_protocol::{Arm, CalibrationKind, CommandId, LampLabel, RestartLevel};
use tracing::{debug, info};

use super::{
    CollaboratorError, ExposureKind, ExposureMetadata, ExposureRequest, ExposureStatus, FileAllocator,
    FileId, HardwareFacade, LampUnitDriver, MetadataAssembler, PipelineClient, ReductionOutput,
};

const HARDWARE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::hardware");

const DEFAULT_READOUT: Duration = Duration::from_millis(200);
const DEFAULT_GRATING_RESOLUTION: u32 = 5_500;
const DEFAULT_WARM_UP: Duration = Duration::from_secs(2);

// =============================================================================
// SimulatedHardware
// =============================================================================

#[derive(Debug, Default)]
struct ArmBench {
    status: ExposureStatus,
    abort_pending: bool,
}

#[derive(Debug, Default)]
struct Bench {
    red: ArmBench,
    blue: ArmBench,
}

impl Bench {
    const fn arm_mut(&mut self, arm: Arm) -> &mut ArmBench {
        match arm {
            Arm::Red => &mut self.red,
            Arm::Blue => &mut self.blue,
        }
    }

    const fn arm(&self, arm: Arm) -> &ArmBench {
        match arm {
            Arm::Red => &self.red,
            Arm::Blue => &self.blue,
        }
    }
}

/// Detector and grating simulation for both arms.
#[derive(Debug)]
pub struct SimulatedHardware {
    bench: Mutex<Bench>,
    changed: Condvar,
    readout: Duration,
    grating_resolution: u32,
}

impl SimulatedHardware {
    /// Simulation with a 200 ms readout and a settled grating.
    #[must_use]
    pub fn new() -> Self {
        Self::with_readout(DEFAULT_READOUT)
    }

    /// Simulation with a custom readout time.
    #[must_use]
    pub fn with_readout(readout: Duration) -> Self {
        Self {
            bench: Mutex::new(Bench::default()),
            changed: Condvar::new(),
            readout,
            grating_resolution: DEFAULT_GRATING_RESOLUTION,
        }
    }

    /// Reports the given grating resolution; zero simulates a grating in
    /// transit.
    #[must_use]
    pub const fn with_grating_resolution(mut self, resolution: u32) -> Self {
        self.grating_resolution = resolution;
        self
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Bench>, CollaboratorError> {
        self.bench
            .lock()
            .map_err(|_| CollaboratorError::new(operation, "simulator state poisoned"))
    }

    fn set_status(
        &self,
        arm: Arm,
        status: ExposureStatus,
        operation: &'static str,
    ) -> Result<(), CollaboratorError> {
        self.lock(operation)?.arm_mut(arm).status = status;
        self.changed.notify_all();
        Ok(())
    }

    fn read_out(&self, arm: Arm, operation: &'static str) -> Result<(), CollaboratorError> {
        self.set_status(arm, ExposureStatus::Readout, operation)?;
        thread::sleep(self.readout);
        self.set_status(arm, ExposureStatus::Idle, operation)
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareFacade for SimulatedHardware {
    fn exposure_status(&self, arm: Arm) -> Result<ExposureStatus, CollaboratorError> {
        Ok(self.lock("exposure_status")?.arm(arm).status)
    }

    fn start_exposure(&self, arm: Arm, request: &ExposureRequest) -> Result<(), CollaboratorError> {
        const OPERATION: &str = "start_exposure";
        let deadline = Instant::now() + request.duration;
        let mut bench = self.lock(OPERATION)?;
        *bench.arm_mut(arm) = ArmBench {
            status: ExposureStatus::Exposing,
            abort_pending: false,
        };
        debug!(
            target: HARDWARE_TARGET,
            %arm,
            file = %request.file,
            duration_ms = request.duration.as_millis(),
            "simulated exposure started"
        );
        loop {
            if bench.arm(arm).abort_pending {
                *bench.arm_mut(arm) = ArmBench::default();
                return Err(CollaboratorError::new(OPERATION, "exposure aborted"));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (next, _) = self
                .changed
                .wait_timeout(bench, remaining)
                .map_err(|_| CollaboratorError::new(OPERATION, "simulator state poisoned"))?;
            bench = next;
        }
        drop(bench);
        self.read_out(arm, OPERATION)
    }

    fn bias(&self, arm: Arm, file: &FileId) -> Result<(), CollaboratorError> {
        debug!(target: HARDWARE_TARGET, %arm, %file, "simulated bias readout");
        self.read_out(arm, "bias")
    }

    fn abort_exposure(&self, arm: Arm) -> Result<(), CollaboratorError> {
        let mut bench = self.lock("abort_exposure")?;
        let slot = bench.arm_mut(arm);
        if slot.status == ExposureStatus::Exposing {
            slot.abort_pending = true;
            self.changed.notify_all();
        }
        info!(target: HARDWARE_TARGET, %arm, "simulated exposure abort");
        Ok(())
    }

    fn setup_in_progress(&self, _arm: Arm) -> Result<bool, CollaboratorError> {
        Ok(false)
    }

    fn abort_setup(&self, arm: Arm) -> Result<(), CollaboratorError> {
        info!(target: HARDWARE_TARGET, %arm, "simulated setup abort");
        Ok(())
    }

    fn grating_resolution(&self, _arm: Arm) -> Result<u32, CollaboratorError> {
        Ok(self.grating_resolution)
    }

    fn abort_grating_motion(&self) -> Result<(), CollaboratorError> {
        info!(target: HARDWARE_TARGET, "simulated grating motion abort");
        Ok(())
    }

    fn reinitialise(&self) -> Result<(), CollaboratorError> {
        *self.lock("reinitialise")? = Bench::default();
        self.changed.notify_all();
        info!(target: HARDWARE_TARGET, "simulated hardware reinitialised");
        Ok(())
    }
}

// =============================================================================
// SimulatedLampUnit
// =============================================================================

/// In-memory lamp unit tracking which light-set is lit.
#[derive(Debug, Default)]
pub struct SimulatedLampUnit {
    lit: Mutex<Option<LampLabel>>,
}

impl SimulatedLampUnit {
    /// Unit with every lamp off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Light-set currently lit.
    #[must_use]
    pub fn lit(&self) -> Option<LampLabel> {
        self.lit.lock().ok().and_then(|lit| lit.clone())
    }

    fn set(&self, label: Option<LampLabel>, operation: &'static str) -> Result<(), CollaboratorError> {
        let mut lit = self
            .lit
            .lock()
            .map_err(|_| CollaboratorError::new(operation, "simulator state poisoned"))?;
        *lit = label;
        Ok(())
    }
}

impl LampUnitDriver for SimulatedLampUnit {
    fn all_off(&self) -> Result<(), CollaboratorError> {
        debug!(target: HARDWARE_TARGET, "simulated lamps off");
        self.set(None, "all_off")
    }

    fn turn_on(&self, label: &LampLabel) -> Result<(), CollaboratorError> {
        debug!(target: HARDWARE_TARGET, %label, "simulated lamp on");
        self.set(Some(label.clone()), "turn_on")
    }

    fn warm_up(&self, _label: &LampLabel) -> Result<Duration, CollaboratorError> {
        Ok(DEFAULT_WARM_UP)
    }
}

// =============================================================================
// SimulatedPipeline / SimulatedMetadata
// =============================================================================

/// Pipeline that reports fixed frame statistics.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedPipeline;

impl PipelineClient for SimulatedPipeline {
    fn reduce(&self, file: &FileId) -> Result<ReductionOutput, CollaboratorError> {
        debug!(target: HARDWARE_TARGET, %file, "simulated reduction");
        Ok(ReductionOutput {
            file: file.clone(),
            mean_counts: 812.5,
            peak_counts: 40_211.0,
        })
    }

    fn notify_abort(&self, command: &CommandId) -> Result<(), CollaboratorError> {
        info!(target: HARDWARE_TARGET, %command, "simulated pipeline abort");
        Ok(())
    }

    fn build_master_calibration(
        &self,
        kind: CalibrationKind,
        directory: &str,
    ) -> Result<FileId, CollaboratorError> {
        let name = match kind {
            CalibrationKind::Bias => "master_bias",
            CalibrationKind::Dark => "master_dark",
            CalibrationKind::Flat => "master_flat",
        };
        Ok(FileId::new(format!("{}/{name}.fits", directory.trim_end_matches('/'))))
    }

    fn notify_restart(&self, level: RestartLevel) -> Result<(), CollaboratorError> {
        info!(target: HARDWARE_TARGET, %level, "simulated pipeline restart notice");
        Ok(())
    }
}

/// Header writer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedMetadata;

impl MetadataAssembler for SimulatedMetadata {
    fn assemble(
        &self,
        arm: Arm,
        file: &FileId,
        metadata: &ExposureMetadata,
    ) -> Result<(), CollaboratorError> {
        debug!(
            target: HARDWARE_TARGET,
            %arm,
            %file,
            command = %metadata.command,
            kind = ?metadata.kind,
            "simulated headers written"
        );
        Ok(())
    }
}

// =============================================================================
// CountingFileAllocator
// =============================================================================

/// Allocates `<arm>_<kind>_<run>.fits` names from per-arm run counters.
#[derive(Debug, Default)]
pub struct CountingFileAllocator {
    red: AtomicU32,
    blue: AtomicU32,
}

impl CountingFileAllocator {
    /// Allocator starting at run 1 on both arms.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileAllocator for CountingFileAllocator {
    fn allocate(&self, arm: Arm, kind: ExposureKind) -> Result<FileId, CollaboratorError> {
        let (prefix, counter) = match arm {
            Arm::Red => ('r', &self.red),
            Arm::Blue => ('b', &self.blue),
        };
        let run = counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        Ok(FileId::new(format!("{prefix}_{}_{run}.fits", kind.code())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn abort_interrupts_running_exposure() {
        let hardware = Arc::new(SimulatedHardware::with_readout(Duration::ZERO));
        let exposing = Arc::clone(&hardware);
        let worker = thread::spawn(move || {
            exposing.start_exposure(
                Arm::Red,
                &ExposureRequest {
                    file: FileId::new("r_e_1.fits"),
                    kind: ExposureKind::Science,
                    duration: Duration::from_secs(30),
                },
            )
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while hardware.exposure_status(Arm::Red).expect("status") != ExposureStatus::Exposing {
            assert!(Instant::now() < deadline, "exposure never started");
            thread::sleep(Duration::from_millis(5));
        }
        hardware.abort_exposure(Arm::Red).expect("abort");

        let result = worker.join().expect("join exposure");
        assert!(result.is_err(), "aborted exposure should fail");
        assert_eq!(
            hardware.exposure_status(Arm::Red).expect("status"),
            ExposureStatus::Idle
        );
    }

    #[test]
    fn allocator_counts_per_arm() {
        let files = CountingFileAllocator::new();
        let first = files.allocate(Arm::Red, ExposureKind::Science).expect("allocate");
        let second = files.allocate(Arm::Red, ExposureKind::Arc).expect("allocate");
        let blue = files.allocate(Arm::Blue, ExposureKind::Bias).expect("allocate");
        assert_eq!(first.as_str(), "r_e_1.fits");
        assert_eq!(second.as_str(), "r_a_2.fits");
        assert_eq!(blue.as_str(), "b_b_1.fits");
    }

    #[test]
    fn lamp_unit_tracks_lit_set() {
        let unit = SimulatedLampUnit::new();
        unit.turn_on(&LampLabel::new("Xe")).expect("turn on");
        assert_eq!(unit.lit(), Some(LampLabel::new("Xe")));
        unit.all_off().expect("all off");
        assert_eq!(unit.lit(), None);
    }
}

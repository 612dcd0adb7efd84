//! Recording collaborators.
//!
//! Each double records the calls it receives so scenarios can assert on the
//! order of hardware, lamp and pipeline operations. Failures are injected per
//! operation name.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use frodo_protocol::{Arm, CalibrationKind, CommandId, LampLabel, RestartLevel};

use crate::dispatch::{CommandFailure, ExecutionPhase, ProgressSink};
use crate::hardware::{
    CollaboratorError, ExposureRequest, ExposureStatus, FileId, HardwareFacade, LampUnitDriver,
    PipelineClient, ReductionOutput, SimulatedHardware, SimulatedPipeline,
};
use crate::process::{ShutdownCause, ShutdownError, ShutdownSignal};
use crate::terminator::{HostControl, ProcessExit};

fn push<T>(log: &Mutex<Vec<T>>, entry: T) {
    log.lock().expect("call log poisoned").push(entry);
}

#[derive(Debug, Default)]
struct Failures(Mutex<HashSet<&'static str>>);

impl Failures {
    fn set(&self, operation: &'static str) {
        self.0.lock().expect("failure set poisoned").insert(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), CollaboratorError> {
        if self.0.lock().expect("failure set poisoned").contains(operation) {
            Err(CollaboratorError::new(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

// -----------------------------------------------------------------------------
// Lamp unit
// -----------------------------------------------------------------------------

/// Lamp unit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LampCall {
    AllOff,
    TurnOn(String),
}

#[derive(Debug, Default)]
struct GateState {
    closed: bool,
    blocked: usize,
}

/// Lamp unit that records switching.
#[derive(Debug, Default)]
pub(crate) struct RecordingLampUnit {
    calls: Mutex<Vec<LampCall>>,
    failures: Failures,
    warm_up_gate: Mutex<GateState>,
    warm_up_changed: Condvar,
}

impl RecordingLampUnit {
    pub(crate) fn calls(&self) -> Vec<LampCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    pub(crate) fn count(&self, call: &LampCall) -> usize {
        self.calls().iter().filter(|recorded| *recorded == call).count()
    }

    pub(crate) fn fail(&self, operation: &'static str) {
        self.failures.set(operation);
    }

    /// Makes every `warm_up` call block until [`Self::open_warm_up`].
    pub(crate) fn close_warm_up(&self) {
        self.warm_up_gate.lock().expect("gate mutex poisoned").closed = true;
    }

    pub(crate) fn open_warm_up(&self) {
        self.warm_up_gate.lock().expect("gate mutex poisoned").closed = false;
        self.warm_up_changed.notify_all();
    }

    /// Waits up to `timeout` for a `warm_up` call to block on the gate.
    pub(crate) fn wait_for_blocked_warm_up(&self, timeout: Duration) -> bool {
        let gate = self.warm_up_gate.lock().expect("gate mutex poisoned");
        let (gate, _) = self
            .warm_up_changed
            .wait_timeout_while(gate, timeout, |gate| gate.blocked == 0)
            .expect("gate mutex poisoned during wait");
        gate.blocked > 0
    }
}

impl LampUnitDriver for RecordingLampUnit {
    fn all_off(&self) -> Result<(), CollaboratorError> {
        self.failures.check("all_off")?;
        push(&self.calls, LampCall::AllOff);
        Ok(())
    }

    fn turn_on(&self, label: &LampLabel) -> Result<(), CollaboratorError> {
        self.failures.check("turn_on")?;
        push(&self.calls, LampCall::TurnOn(label.as_str().to_owned()));
        Ok(())
    }

    fn warm_up(&self, _label: &LampLabel) -> Result<Duration, CollaboratorError> {
        let mut gate = self.warm_up_gate.lock().expect("gate mutex poisoned");
        if gate.closed {
            gate.blocked += 1;
            self.warm_up_changed.notify_all();
            gate = self
                .warm_up_changed
                .wait_while(gate, |gate| gate.closed)
                .expect("gate mutex poisoned during wait");
            gate.blocked -= 1;
        }
        drop(gate);
        self.failures.check("warm_up")?;
        Ok(Duration::from_secs(2))
    }
}

// -----------------------------------------------------------------------------
// Hardware
// -----------------------------------------------------------------------------

/// Hardware operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HardwareCall {
    ExposureStatus(Arm),
    StartExposure(Arm),
    Bias(Arm),
    AbortExposure(Arm),
    SetupInProgress(Arm),
    AbortSetup(Arm),
    GratingResolution(Arm),
    AbortGratingMotion,
    Reinitialise,
}

/// Simulated hardware that records every call.
#[derive(Debug)]
pub(crate) struct RecordingHardware {
    inner: SimulatedHardware,
    calls: Mutex<Vec<HardwareCall>>,
    failures: Failures,
}

impl Default for RecordingHardware {
    fn default() -> Self {
        Self {
            inner: SimulatedHardware::with_readout(Duration::from_millis(5)),
            calls: Mutex::new(Vec::new()),
            failures: Failures::default(),
        }
    }
}

impl RecordingHardware {
    pub(crate) fn calls(&self) -> Vec<HardwareCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    pub(crate) fn saw(&self, call: HardwareCall) -> bool {
        self.calls().contains(&call)
    }

    pub(crate) fn fail(&self, operation: &'static str) {
        self.failures.set(operation);
    }

    /// Waits until `arm` reports an exposure in progress.
    pub(crate) fn wait_until_exposing(&self, arm: Arm, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.inner.exposure_status(arm).ok() == Some(ExposureStatus::Exposing) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn record(&self, call: HardwareCall, operation: &'static str) -> Result<(), CollaboratorError> {
        push(&self.calls, call);
        self.failures.check(operation)
    }
}

impl HardwareFacade for RecordingHardware {
    fn exposure_status(&self, arm: Arm) -> Result<ExposureStatus, CollaboratorError> {
        self.record(HardwareCall::ExposureStatus(arm), "exposure_status")?;
        self.inner.exposure_status(arm)
    }

    fn start_exposure(&self, arm: Arm, request: &ExposureRequest) -> Result<(), CollaboratorError> {
        self.record(HardwareCall::StartExposure(arm), "start_exposure")?;
        self.inner.start_exposure(arm, request)
    }

    fn bias(&self, arm: Arm, file: &FileId) -> Result<(), CollaboratorError> {
        self.record(HardwareCall::Bias(arm), "bias")?;
        self.inner.bias(arm, file)
    }

    fn abort_exposure(&self, arm: Arm) -> Result<(), CollaboratorError> {
        self.record(HardwareCall::AbortExposure(arm), "abort_exposure")?;
        self.inner.abort_exposure(arm)
    }

    fn setup_in_progress(&self, arm: Arm) -> Result<bool, CollaboratorError> {
        self.record(HardwareCall::SetupInProgress(arm), "setup_in_progress")?;
        self.inner.setup_in_progress(arm)
    }

    fn abort_setup(&self, arm: Arm) -> Result<(), CollaboratorError> {
        self.record(HardwareCall::AbortSetup(arm), "abort_setup")?;
        self.inner.abort_setup(arm)
    }

    fn grating_resolution(&self, arm: Arm) -> Result<u32, CollaboratorError> {
        self.record(HardwareCall::GratingResolution(arm), "grating_resolution")?;
        self.inner.grating_resolution(arm)
    }

    fn abort_grating_motion(&self) -> Result<(), CollaboratorError> {
        self.record(HardwareCall::AbortGratingMotion, "abort_grating_motion")?;
        self.inner.abort_grating_motion()
    }

    fn reinitialise(&self) -> Result<(), CollaboratorError> {
        self.record(HardwareCall::Reinitialise, "reinitialise")?;
        self.inner.reinitialise()
    }
}

// -----------------------------------------------------------------------------
// Pipeline
// -----------------------------------------------------------------------------

/// Pipeline operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PipelineCall {
    Reduce(String),
    NotifyAbort(String),
    BuildMaster(CalibrationKind, String),
    NotifyRestart(RestartLevel),
}

/// Simulated pipeline that records every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingPipeline {
    calls: Mutex<Vec<PipelineCall>>,
    failures: Failures,
}

impl RecordingPipeline {
    pub(crate) fn calls(&self) -> Vec<PipelineCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    pub(crate) fn fail(&self, operation: &'static str) {
        self.failures.set(operation);
    }
}

impl PipelineClient for RecordingPipeline {
    fn reduce(&self, file: &FileId) -> Result<ReductionOutput, CollaboratorError> {
        push(&self.calls, PipelineCall::Reduce(file.as_str().to_owned()));
        self.failures.check("reduce")?;
        SimulatedPipeline.reduce(file)
    }

    fn notify_abort(&self, command: &CommandId) -> Result<(), CollaboratorError> {
        push(&self.calls, PipelineCall::NotifyAbort(command.as_str().to_owned()));
        self.failures.check("notify_abort")
    }

    fn build_master_calibration(
        &self,
        kind: CalibrationKind,
        directory: &str,
    ) -> Result<FileId, CollaboratorError> {
        push(&self.calls, PipelineCall::BuildMaster(kind, directory.to_owned()));
        self.failures.check("build_master_calibration")?;
        SimulatedPipeline.build_master_calibration(kind, directory)
    }

    fn notify_restart(&self, level: RestartLevel) -> Result<(), CollaboratorError> {
        push(&self.calls, PipelineCall::NotifyRestart(level));
        self.failures.check("notify_restart")
    }
}

// -----------------------------------------------------------------------------
// Host and process
// -----------------------------------------------------------------------------

/// Host control that only records requests.
#[derive(Debug, Default)]
pub(crate) struct RecordingHostControl {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingHostControl {
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("call log poisoned").clone()
    }
}

impl HostControl for RecordingHostControl {
    fn reboot(&self) -> Result<(), CollaboratorError> {
        push(&self.calls, "reboot");
        Ok(())
    }

    fn power_off(&self) -> Result<(), CollaboratorError> {
        push(&self.calls, "power_off");
        Ok(())
    }
}

/// Records the exit status instead of exiting.
#[derive(Debug, Default)]
pub(crate) struct RecordingProcessExit {
    status: Mutex<Option<i32>>,
    exited: Condvar,
}

impl RecordingProcessExit {
    /// Waits up to `timeout` for an exit request.
    pub(crate) fn wait_for_exit(&self, timeout: Duration) -> Option<i32> {
        let status = self.status.lock().expect("exit mutex poisoned");
        let (status, _) = self
            .exited
            .wait_timeout_while(status, timeout, |status| status.is_none())
            .expect("exit mutex poisoned during wait");
        *status
    }

    pub(crate) fn status(&self) -> Option<i32> {
        *self.status.lock().expect("exit mutex poisoned")
    }
}

impl ProcessExit for RecordingProcessExit {
    fn exit(&self, status: i32) {
        *self.status.lock().expect("exit mutex poisoned") = Some(status);
        self.exited.notify_all();
    }
}

// -----------------------------------------------------------------------------
// Protocol
// -----------------------------------------------------------------------------

/// Progress sink that accepts everything.
#[derive(Debug, Default)]
pub(crate) struct NullProgress;

impl ProgressSink for NullProgress {
    fn acknowledge(&mut self, _estimate: Duration) -> Result<(), CommandFailure> {
        Ok(())
    }

    fn enter(&mut self, _phase: ExecutionPhase) {}
}

/// Shutdown signal released by the test.
#[derive(Clone)]
pub(crate) struct TestShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub(crate) fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        *triggered = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut triggered = lock.lock().expect("shutdown mutex poisoned");
        while !*triggered {
            triggered = cvar
                .wait(triggered)
                .expect("shutdown mutex poisoned during wait");
        }
        Ok(ShutdownCause::Requested)
    }
}

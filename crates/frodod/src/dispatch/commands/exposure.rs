//! Frame-producing commands: `expose`, `bias`, `dark` and `arc`.
//!
//! All four share one phase sequence per arm. The lamp unit is acquired
//! first (dark for everything but `arc`), then each frame is allocated,
//! acknowledged, exposed, given headers and reduced. Arcs give the lamp back
//! as soon as the shutter closes so the other arm is not held up by
//! reduction.

use std::time::Duration;

use frodo_protocol::{Arm, Command, CommandPayload, CommandResult, ExposurePhase};
use tracing::{debug, info};

use crate::context::ServerContext;
use crate::dispatch::DISPATCH_TARGET;
use crate::dispatch::errors::CommandFailure;
use crate::dispatch::session::{ExecutionPhase, Execution};
use crate::hardware::{ExposureKind, ExposureMetadata, ExposureRequest, ReductionOutput};
use crate::lamp::{LampGuard, LampRequest};

use super::{CommandOutcome, payload_mismatch, required_arms};

struct FramePlan {
    kind: ExposureKind,
    lamp: LampRequest,
    duration: Duration,
    frames: u32,
    early_lamp_release: bool,
}

impl FramePlan {
    fn from_command(command: &Command) -> Result<Self, CommandFailure> {
        let plan = match &command.payload {
            CommandPayload::Expose(payload) => {
                if payload.count == 0 {
                    return Err(CommandFailure::invalid_argument("count must be at least 1"));
                }
                Self {
                    kind: ExposureKind::Science,
                    lamp: LampRequest::NoLamp,
                    duration: Duration::from_millis(payload.exposure_ms),
                    frames: payload.count,
                    early_lamp_release: false,
                }
            }
            CommandPayload::Bias => Self {
                kind: ExposureKind::Bias,
                lamp: LampRequest::NoLamp,
                duration: Duration::ZERO,
                frames: 1,
                early_lamp_release: false,
            },
            CommandPayload::Dark(payload) => Self {
                kind: ExposureKind::Dark,
                lamp: LampRequest::NoLamp,
                duration: Duration::from_millis(payload.exposure_ms),
                frames: 1,
                early_lamp_release: false,
            },
            CommandPayload::Arc(payload) => {
                if payload.lamp.as_str().trim().is_empty() {
                    return Err(CommandFailure::invalid_argument("lamp label is empty"));
                }
                Self {
                    kind: ExposureKind::Arc,
                    lamp: LampRequest::Lamps(payload.lamp.clone()),
                    duration: Duration::from_millis(payload.exposure_ms),
                    frames: 1,
                    early_lamp_release: true,
                }
            }
            _ => return Err(payload_mismatch(command)),
        };
        Ok(plan)
    }

    /// Acknowledgement sent before each frame.
    fn frame_estimate(&self, context: &ServerContext) -> Duration {
        context.config().default_ack().saturating_add(self.duration)
    }
}

pub(crate) fn estimate_expose(context: &ServerContext, command: &Command) -> Duration {
    let CommandPayload::Expose(payload) = &command.payload else {
        return context.config().default_ack();
    };
    let arms = u32::try_from(command.arm.arms().len()).unwrap_or(1);
    Duration::from_millis(payload.exposure_ms)
        .saturating_mul(payload.count.max(1))
        .saturating_mul(arms.max(1))
        .saturating_add(context.config().default_ack())
}

pub(crate) fn estimate_bias(context: &ServerContext, _command: &Command) -> Duration {
    context.config().default_ack()
}

pub(crate) fn estimate_dark(context: &ServerContext, command: &Command) -> Duration {
    let exposure = match &command.payload {
        CommandPayload::Dark(payload) => Duration::from_millis(payload.exposure_ms),
        _ => Duration::ZERO,
    };
    context.config().default_ack().saturating_add(exposure)
}

pub(crate) fn estimate_arc(context: &ServerContext, command: &Command) -> Duration {
    let CommandPayload::Arc(payload) = &command.payload else {
        return context.config().default_ack();
    };
    let warm_up = context.lamp().warm_up(&payload.lamp).unwrap_or_else(|error| {
        debug!(
            target: DISPATCH_TARGET,
            lamp = %payload.lamp,
            %error,
            "lamp warm-up query failed; estimating without it"
        );
        Duration::ZERO
    });
    context
        .config()
        .default_ack()
        .saturating_add(Duration::from_millis(payload.exposure_ms))
        .saturating_add(warm_up)
}

pub(crate) fn execute_expose(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    run_frames(context, command, execution)
}

pub(crate) fn execute_bias(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    run_frames(context, command, execution)
}

pub(crate) fn execute_dark(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    run_frames(context, command, execution)
}

pub(crate) fn execute_arc(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    run_frames(context, command, execution)
}

#[derive(Default)]
struct Frames {
    files: Vec<String>,
    last: Option<ReductionOutput>,
}

fn run_frames(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
) -> CommandOutcome {
    let plan = FramePlan::from_command(command)?;
    let arms = required_arms(command)?;
    let mut frames = Frames::default();
    for &arm in arms {
        let result = run_arm(context, command, execution, &plan, arm, &mut frames);
        execution.set_phase(arm, ExposurePhase::Idle);
        result?;
    }
    let (mean_counts, peak_counts) = frames
        .last
        .as_ref()
        .map_or((0.0, 0.0), |output| (output.mean_counts, output.peak_counts));
    Ok(Some(CommandResult::Exposure {
        files: frames.files,
        mean_counts,
        peak_counts,
    }))
}

fn run_arm(
    context: &ServerContext,
    command: &Command,
    execution: &mut Execution<'_>,
    plan: &FramePlan,
    arm: Arm,
    frames: &mut Frames,
) -> Result<(), CommandFailure> {
    execution.checkpoint(arm)?;
    let mut lamp = Some(acquire_lamp(context, execution, plan, arm)?);
    let frame_estimate = plan.frame_estimate(context);

    for frame in 1..=plan.frames {
        execution.checkpoint(arm)?;
        let file = context
            .files()
            .allocate(arm, plan.kind)
            .map_err(CommandFailure::Artefact)?;
        execution.acknowledge(frame_estimate)?;

        execution.set_phase(arm, ExposurePhase::Exposing);
        execution.enter(ExecutionPhase::HardwareOp);
        info!(
            target: DISPATCH_TARGET,
            command = %command.id,
            %arm,
            %file,
            frame,
            frames = plan.frames,
            "exposing"
        );
        let exposed = match plan.kind {
            ExposureKind::Bias => context.hardware().bias(arm, &file),
            kind => context.hardware().start_exposure(
                arm,
                &ExposureRequest {
                    file: file.clone(),
                    kind,
                    duration: plan.duration,
                },
            ),
        };
        if let Err(source) = exposed {
            // A forceful abort makes the blocked call fail; report the abort.
            execution.checkpoint(arm)?;
            return Err(CommandFailure::Hardware(source));
        }

        if plan.early_lamp_release
            && let Some(guard) = lamp.take()
        {
            guard.release()?;
        }

        context
            .metadata()
            .assemble(
                arm,
                &file,
                &ExposureMetadata {
                    command: command.id.clone(),
                    kind: plan.kind,
                    duration: plan.duration,
                    lamp: plan.lamp.label().cloned(),
                },
            )
            .map_err(CommandFailure::Artefact)?;

        execution.checkpoint(arm)?;
        execution.set_phase(arm, ExposurePhase::Reducing);
        execution.enter(ExecutionPhase::Reducing);
        let output = context
            .pipeline()
            .reduce(&file)
            .map_err(CommandFailure::Pipeline)?;
        frames.files.push(output.file.to_string());
        frames.last = Some(output);
    }

    if let Some(guard) = lamp.take() {
        guard.release()?;
    }
    Ok(())
}

fn acquire_lamp<'c>(
    context: &'c ServerContext,
    execution: &mut Execution<'_>,
    plan: &FramePlan,
    arm: Arm,
) -> Result<LampGuard<'c>, CommandFailure> {
    execution.set_phase(arm, ExposurePhase::Acquiring);
    execution.enter(ExecutionPhase::Acquiring);
    let keep_alive = context
        .lamp()
        .wait_interval()
        .saturating_add(plan.frame_estimate(context));
    let acquired = context.lamp().acquire(plan.lamp.clone(), || {
        execution.checkpoint(arm)?;
        execution.acknowledge(keep_alive)
    });
    match acquired {
        Ok(guard) => Ok(guard),
        Err(error) => {
            execution.checkpoint(arm)?;
            Err(error.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use frodo_protocol::{ArcPayload, ArmSelector, CommandId, CommandKind, DarkPayload, LampLabel};
    use rstest::rstest;

    use super::*;
    use crate::arms::{ArmRegistry, WorkerRef};
    use crate::dispatch::session::ProgressSink;
    use crate::tests::support::{LampCall, test_collaborators};

    /// Raises the abort for `arm` as soon as the command asks for the lamp.
    struct AbortWhileAcquiring<'a> {
        arms: &'a ArmRegistry,
        arm: Arm,
    }

    impl ProgressSink for AbortWhileAcquiring<'_> {
        fn acknowledge(&mut self, _estimate: Duration) -> Result<(), CommandFailure> {
            Ok(())
        }

        fn enter(&mut self, phase: ExecutionPhase) {
            if phase == ExecutionPhase::Acquiring {
                self.arms.request_abort(self.arm);
            }
        }
    }

    fn arc() -> CommandPayload {
        CommandPayload::Arc(ArcPayload {
            lamp: LampLabel::new("Xe"),
            exposure_ms: 1_000,
        })
    }

    fn dark() -> CommandPayload {
        CommandPayload::Dark(DarkPayload { exposure_ms: 1_000 })
    }

    #[rstest]
    #[case::arc(
        arc(),
        CommandKind::Arc,
        vec![LampCall::AllOff, LampCall::TurnOn(String::from("Xe")), LampCall::AllOff],
    )]
    #[case::dark(dark(), CommandKind::Dark, vec![LampCall::AllOff, LampCall::AllOff])]
    fn abort_after_acquisition_gives_the_lamp_back(
        #[case] payload: CommandPayload,
        #[case] kind: CommandKind,
        #[case] expected_calls: Vec<LampCall>,
    ) {
        let bench = test_collaborators().into_bench();
        let context = &bench.context;
        let command = Command::new(CommandId::new("frame-1"), ArmSelector::Red, payload);
        let registration = context
            .arms()
            .register(&[Arm::Red], WorkerRef::new(command.id.clone(), kind));
        let mut progress = AbortWhileAcquiring {
            arms: context.arms(),
            arm: Arm::Red,
        };
        let mut execution = Execution::new(&mut progress, Some(&registration));

        let failure = run_frames(context, &command, &mut execution).expect_err("aborted");

        assert!(failure.is_aborted(), "{failure:?}");
        assert_eq!(context.lamp().holders(), 0);
        assert_eq!(context.lamp().active(), None);
        assert_eq!(bench.lamp_unit.calls(), expected_calls);
        assert!(bench.hardware.calls().is_empty());
        assert_eq!(context.arms().phase(Arm::Red), ExposurePhase::Idle);
    }
}

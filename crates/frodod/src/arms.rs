//! Per-arm ownership and cooperative abort signalling.
//!
//! Each arm has one slot recording which command owns it, the last phase that
//! command reported, and an abort flag. Ordinary commands register for the
//! arms they drive and poll the flag at checkpoints; the abort command sets
//! the flag from its own thread and then cancels whatever hardware call the
//! owner is blocked in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use frodo_protocol::{Arm, ArmStatus, CommandId, CommandKind, ExposurePhase};
use tracing::{debug, info, warn};

const ARMS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::arms");

/// Identity of the command owning an arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRef {
    /// Owning command's id.
    pub id: CommandId,
    /// Owning command's kind.
    pub kind: CommandKind,
}

impl WorkerRef {
    /// Builds a reference.
    pub const fn new(id: CommandId, kind: CommandKind) -> Self {
        Self { id, kind }
    }
}

#[derive(Debug, Default)]
struct ArmSlot {
    owner: Option<WorkerRef>,
    phase: ExposurePhase,
}

#[derive(Debug, Default)]
struct Slots {
    red: ArmSlot,
    blue: ArmSlot,
}

impl Slots {
    const fn get_mut(&mut self, arm: Arm) -> &mut ArmSlot {
        match arm {
            Arm::Red => &mut self.red,
            Arm::Blue => &mut self.blue,
        }
    }

    const fn get(&self, arm: Arm) -> &ArmSlot {
        match arm {
            Arm::Red => &self.red,
            Arm::Blue => &self.blue,
        }
    }
}

/// Raised by a checkpoint that observes an abort request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("command aborted on the {arm} arm")]
pub struct Aborted {
    /// Arm whose flag was set.
    pub arm: Arm,
}

/// Registry of the command owning each arm.
///
/// Slots are mutated under one lock. Abort flags are atomics so checkpoints
/// stay lock-free.
#[derive(Debug, Default)]
pub struct ArmRegistry {
    slots: Mutex<Slots>,
    red_abort: AtomicBool,
    blue_abort: AtomicBool,
}

impl ArmRegistry {
    /// Registry with both arms idle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // Slot contents stay consistent across a panicking holder, so a
        // poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    const fn flag(&self, arm: Arm) -> &AtomicBool {
        match arm {
            Arm::Red => &self.red_abort,
            Arm::Blue => &self.blue_abort,
        }
    }

    /// Records `worker` as owner of every arm in `arms`.
    ///
    /// At most one ordinary command is expected per arm. A second
    /// registration replaces the previous owner and is logged. The abort flag
    /// is left alone; it is only lowered when the owning registration is
    /// released.
    pub fn register(&self, arms: &[Arm], worker: WorkerRef) -> ArmRegistration<'_> {
        let mut slots = self.slots();
        for &arm in arms {
            let slot = slots.get_mut(arm);
            if let Some(previous) = slot.owner.as_ref() {
                warn!(
                    target: ARMS_TARGET,
                    %arm,
                    previous = %previous.id,
                    replacement = %worker.id,
                    "arm already owned; replacing owner"
                );
            }
            slot.owner = Some(worker.clone());
            slot.phase = ExposurePhase::Idle;
            debug!(target: ARMS_TARGET, %arm, command = %worker.id, "arm registered");
        }
        drop(slots);
        ArmRegistration {
            registry: self,
            arms: arms.to_vec(),
            worker,
        }
    }

    /// Flags the owner of `arm` for abort and returns it.
    ///
    /// The flag is only raised while an owner is registered, so an abort sent
    /// to an idle arm never leaks into the next command.
    pub fn request_abort(&self, arm: Arm) -> Option<WorkerRef> {
        let slots = self.slots();
        let owner = slots.get(arm).owner.clone();
        if let Some(worker) = owner.as_ref() {
            self.flag(arm).store(true, Ordering::SeqCst);
            info!(target: ARMS_TARGET, %arm, command = %worker.id, "abort requested");
        } else {
            debug!(target: ARMS_TARGET, %arm, "abort requested for idle arm");
        }
        owner
    }

    /// Unsets the owner and abort flag of `arm`.
    pub fn clear(&self, arm: Arm) {
        let mut slots = self.slots();
        *slots.get_mut(arm) = ArmSlot::default();
        self.flag(arm).store(false, Ordering::SeqCst);
    }

    fn release(&self, arm: Arm, worker: &CommandId) {
        let mut slots = self.slots();
        let slot = slots.get_mut(arm);
        if slot.owner.as_ref().is_some_and(|owner| &owner.id == worker) {
            *slot = ArmSlot::default();
            self.flag(arm).store(false, Ordering::SeqCst);
            debug!(target: ARMS_TARGET, %arm, command = %worker, "arm released");
        }
    }

    /// Whether an abort is pending for `arm`.
    #[must_use]
    pub fn abort_requested(&self, arm: Arm) -> bool {
        self.flag(arm).load(Ordering::SeqCst)
    }

    /// Records the phase `arm` is in.
    pub fn set_phase(&self, arm: Arm, phase: ExposurePhase) {
        self.slots().get_mut(arm).phase = phase;
    }

    /// Last phase recorded for `arm`.
    #[must_use]
    pub fn phase(&self, arm: Arm) -> ExposurePhase {
        self.slots().get(arm).phase
    }

    /// Current owner of `arm`.
    #[must_use]
    pub fn owner(&self, arm: Arm) -> Option<WorkerRef> {
        self.slots().get(arm).owner.clone()
    }

    /// Status of both arms, red first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ArmStatus> {
        let slots = self.slots();
        Arm::ALL
            .into_iter()
            .map(|arm| {
                let slot = slots.get(arm);
                ArmStatus {
                    arm,
                    phase: slot.phase,
                    owner: slot.owner.as_ref().map(|owner| owner.id.clone()),
                }
            })
            .collect()
    }
}

/// Ownership of one or more arms, released on drop.
#[derive(Debug)]
pub struct ArmRegistration<'a> {
    registry: &'a ArmRegistry,
    arms: Vec<Arm>,
    worker: WorkerRef,
}

impl ArmRegistration<'_> {
    /// Arms held by this registration.
    #[must_use]
    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    /// Fails when an abort has been requested for `arm`.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] when the flag is set.
    pub fn checkpoint(&self, arm: Arm) -> Result<(), Aborted> {
        if self.registry.abort_requested(arm) {
            debug!(
                target: ARMS_TARGET,
                %arm,
                command = %self.worker.id,
                "abort observed at checkpoint"
            );
            return Err(Aborted { arm });
        }
        Ok(())
    }

    /// Records the phase of a held arm.
    pub fn set_phase(&self, arm: Arm, phase: ExposurePhase) {
        self.registry.set_phase(arm, phase);
    }
}

impl Drop for ArmRegistration<'_> {
    fn drop(&mut self) {
        for &arm in &self.arms {
            self.registry.release(arm, &self.worker.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn registry() -> ArmRegistry {
        ArmRegistry::new()
    }

    fn worker(id: &str) -> WorkerRef {
        WorkerRef::new(CommandId::new(id), CommandKind::Expose)
    }

    #[rstest]
    fn abort_is_observed_at_checkpoint(registry: ArmRegistry) {
        let registration = registry.register(&[Arm::Red], worker("c-1"));
        assert!(registration.checkpoint(Arm::Red).is_ok());

        let owner = registry.request_abort(Arm::Red);
        assert_eq!(owner.map(|owner| owner.id), Some(CommandId::new("c-1")));
        assert_eq!(
            registration.checkpoint(Arm::Red),
            Err(Aborted { arm: Arm::Red })
        );
    }

    #[rstest]
    fn abort_on_idle_arm_is_not_latched(registry: ArmRegistry) {
        assert!(registry.request_abort(Arm::Blue).is_none());
        assert!(!registry.abort_requested(Arm::Blue));

        let registration = registry.register(&[Arm::Blue], worker("c-2"));
        assert!(registration.checkpoint(Arm::Blue).is_ok());
    }

    #[rstest]
    fn abort_before_first_checkpoint_is_kept(registry: ArmRegistry) {
        let registration = registry.register(&Arm::ALL, worker("c-8"));
        assert!(registry.request_abort(Arm::Blue).is_some());
        registration.set_phase(Arm::Blue, ExposurePhase::Acquiring);
        assert!(registration.checkpoint(Arm::Red).is_ok());
        assert_eq!(
            registration.checkpoint(Arm::Blue),
            Err(Aborted { arm: Arm::Blue })
        );
        drop(registration);
        assert!(!registry.abort_requested(Arm::Blue));
    }

    #[rstest]
    fn dropping_registration_clears_every_arm(registry: ArmRegistry) {
        {
            let registration = registry.register(&Arm::ALL, worker("c-3"));
            registration.set_phase(Arm::Blue, ExposurePhase::Exposing);
            registry.request_abort(Arm::Red);
        }
        for arm in Arm::ALL {
            assert!(registry.owner(arm).is_none());
            assert!(!registry.abort_requested(arm));
            assert_eq!(registry.phase(arm), ExposurePhase::Idle);
        }
    }

    #[rstest]
    fn replaced_owner_is_not_cleared_by_stale_registration(registry: ArmRegistry) {
        let first = registry.register(&[Arm::Red], worker("c-4"));
        let second = registry.register(&[Arm::Red], worker("c-5"));
        drop(first);
        assert_eq!(
            registry.owner(Arm::Red).map(|owner| owner.id),
            Some(CommandId::new("c-5"))
        );
        drop(second);
        assert!(registry.owner(Arm::Red).is_none());
    }

    #[rstest]
    fn snapshot_reports_owner_and_phase(registry: ArmRegistry) {
        let registration = registry.register(&[Arm::Blue], worker("c-6"));
        registration.set_phase(Arm::Blue, ExposurePhase::Reducing);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.first().map(|status| status.arm), Some(Arm::Red));
        let blue = snapshot.get(1).expect("blue status");
        assert_eq!(blue.phase, ExposurePhase::Reducing);
        assert_eq!(blue.owner, Some(CommandId::new("c-6")));
    }

    #[rstest]
    fn clear_resets_slot(registry: ArmRegistry) {
        let registration = registry.register(&[Arm::Red], worker("c-7"));
        registry.request_abort(Arm::Red);
        registry.clear(Arm::Red);
        assert!(registration.checkpoint(Arm::Red).is_ok());
        assert!(registry.owner(Arm::Red).is_none());
    }
}

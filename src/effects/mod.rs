//! Scheduler-driven effects that react to the audio snapshot.

pub mod crowd;
pub mod flash;
pub mod inputs;

pub use crowd::{CrowdEffect, CrowdMember};
pub use flash::{BeatFlash, Spark};
pub use inputs::EffectInputs;

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use crate::animation::{AnimationScheduler, FrameContext, Priority, Registration};
use crate::error::SchedulerError;

/// A per-frame update the scheduler can own.
pub trait Effect {
    fn id(&self) -> &str;

    fn priority(&self) -> Priority;

    /// Explicit rate in Hz; `None` follows the priority.
    fn update_rate(&self) -> Option<f32> {
        None
    }

    fn update(&mut self, ctx: &FrameContext) -> anyhow::Result<()>;
}

/// Shared ownership of a registered effect.
///
/// The scheduler drives the effect; the holder reads its state between
/// frames and must call `detach` on teardown.
pub struct EffectHandle<E> {
    state: Rc<RefCell<E>>,
    registration: Registration,
}

impl<E: Effect + 'static> EffectHandle<E> {
    pub fn attach(effect: E, scheduler: &mut AnimationScheduler) -> Result<Self, SchedulerError> {
        let id = effect.id().to_string();
        let priority = effect.priority();
        let rate = effect.update_rate();
        let state = Rc::new(RefCell::new(effect));

        let driven = state.clone();
        let registration = scheduler.register(id, priority, rate, move |ctx| {
            driven.borrow_mut().update(ctx)
        })?;

        Ok(Self {
            state,
            registration,
        })
    }

    pub fn state(&self) -> Ref<'_, E> {
        self.state.borrow()
    }

    pub fn id(&self) -> &str {
        self.registration.id()
    }

    /// Unregister; takes effect before the scheduler's next dispatch.
    pub fn detach(self) {
        self.registration.unregister();
    }
}

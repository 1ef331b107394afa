use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::AudioSnapshot;
use crate::error::SchedulerError;
use crate::performance::{ComponentQuality, PerformancePreset};

/// Update rates are expressed against this many ticks per second.
pub const BASE_RATE_HZ: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Per-priority update rates in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub high: f32,
    pub medium: f32,
    pub low: f32,
}

impl RateTable {
    pub const fn new(high: f32, medium: f32, low: f32) -> Self {
        Self { high, medium, low }
    }

    pub fn rate_for(&self, priority: Priority) -> f32 {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    /// Rates for the FPS band `fps` falls in.
    pub fn for_fps(fps: f32) -> Self {
        PerformancePreset::for_fps(fps).rates()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        PerformancePreset::High.rates()
    }
}

/// Everything an update callback sees for one frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub now_ms: f64,
    pub delta_seconds: f32,
    pub camera: Vec3,
    pub audio: Arc<AudioSnapshot>,
    pub quality: ComponentQuality,
}

impl FrameContext {
    pub fn new(now_ms: f64, delta_seconds: f32, audio: Arc<AudioSnapshot>) -> Self {
        Self {
            now_ms,
            delta_seconds,
            camera: Vec3::ZERO,
            audio,
            quality: PerformancePreset::High.quality(),
        }
    }

    pub fn with_camera(mut self, camera: Vec3) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_quality(mut self, quality: ComponentQuality) -> Self {
        self.quality = quality;
        self
    }
}

pub type UpdateFn = Box<dyn FnMut(&FrameContext) -> anyhow::Result<()>>;

/// Dispatch counters for one registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStats {
    pub dispatches: u64,
    pub failures: u64,
}

struct Entry {
    callback: UpdateFn,
    priority: Priority,
    rate: Option<f32>,
    enabled: bool,
    generation: u64,
    stats: EntryStats,
}

impl Entry {
    /// Explicit rates hold as given under the full-quality table and scale
    /// with the priority's rate when quality drops.
    fn effective_rate(&self, rates: &RateTable) -> f32 {
        let current = rates.rate_for(self.priority);
        match self.rate {
            Some(rate) => {
                let full = RateTable::default().rate_for(self.priority);
                if full > 0.0 {
                    rate * current / full
                } else {
                    rate
                }
            }
            None => current,
        }
    }
}

fn frame_interval(rate: f32) -> u64 {
    if !(rate > 0.0) {
        return u64::MAX;
    }
    ((BASE_RATE_HZ / rate).round() as u64).max(1)
}

fn validate(id: &str, rate: Option<f32>) -> Result<(), SchedulerError> {
    if id.is_empty() {
        return Err(SchedulerError::EmptyId);
    }
    match rate {
        Some(rate) if !(rate.is_finite() && rate > 0.0) => Err(SchedulerError::InvalidRate {
            id: id.to_string(),
            rate,
        }),
        _ => Ok(()),
    }
}

enum Command {
    Register {
        id: String,
        priority: Priority,
        rate: Option<f32>,
        callback: UpdateFn,
        generation: u64,
    },
    Unregister {
        id: String,
        generation: Option<u64>,
    },
    SetEnabled {
        id: String,
        enabled: bool,
    },
}

/// Proof of one registration; `unregister` removes exactly that entry, so a
/// stale handle cannot remove a newer registration under the same id.
#[must_use = "keep the registration to unregister on teardown"]
pub struct Registration {
    id: String,
    generation: u64,
    commands: Sender<Command>,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue removal; applied before the scheduler's next dispatch.
    pub fn unregister(self) {
        let _ = self.commands.send(Command::Unregister {
            id: self.id,
            generation: Some(self.generation),
        });
    }
}

/// Cloneable access for code running inside a tick. Mutations are queued
/// and applied before the next callback is dispatched.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: Sender<Command>,
    generations: Arc<AtomicU64>,
}

impl SchedulerHandle {
    pub fn register<F>(
        &self,
        id: impl Into<String>,
        priority: Priority,
        rate: Option<f32>,
        callback: F,
    ) -> Result<Registration, SchedulerError>
    where
        F: FnMut(&FrameContext) -> anyhow::Result<()> + 'static,
    {
        let id = id.into();
        validate(&id, rate)?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = self.commands.send(Command::Register {
            id: id.clone(),
            priority,
            rate,
            callback: Box::new(callback),
            generation,
        });
        Ok(Registration {
            id,
            generation,
            commands: self.commands.clone(),
        })
    }

    pub fn unregister(&self, id: impl Into<String>) {
        let _ = self.commands.send(Command::Unregister {
            id: id.into(),
            generation: None,
        });
    }

    pub fn set_enabled(&self, id: impl Into<String>, enabled: bool) {
        let _ = self.commands.send(Command::SetEnabled {
            id: id.into(),
            enabled,
        });
    }
}

/// Drives every registered update callback from one per-frame tick.
///
/// An entry running at `rate` Hz fires on frames where
/// `frame % round(60 / rate) == 0`, so low-rate work only costs time on a
/// fraction of frames.
pub struct AnimationScheduler {
    entries: HashMap<String, Entry>,
    rates: RateTable,
    frame_count: u64,
    generations: Arc<AtomicU64>,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::with_rates(RateTable::default())
    }

    pub fn with_rates(rates: RateTable) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            entries: HashMap::new(),
            rates,
            frame_count: 0,
            generations: Arc::new(AtomicU64::new(0)),
            sender,
            receiver,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            commands: self.sender.clone(),
            generations: self.generations.clone(),
        }
    }

    /// Insert or overwrite (last writer wins) the entry for `id`.
    ///
    /// `rate` of `None` follows the priority's rate. An explicit rate is
    /// honoured at full quality and scaled down with the priority's rate
    /// under cheaper presets.
    pub fn register<F>(
        &mut self,
        id: impl Into<String>,
        priority: Priority,
        rate: Option<f32>,
        callback: F,
    ) -> Result<Registration, SchedulerError>
    where
        F: FnMut(&FrameContext) -> anyhow::Result<()> + 'static,
    {
        let id = id.into();
        validate(&id, rate)?;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.insert(id.clone(), priority, rate, Box::new(callback), generation);

        Ok(Registration {
            id,
            generation,
            commands: self.sender.clone(),
        })
    }

    /// Remove `id`; absent ids are ignored.
    pub fn unregister(&mut self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!("Unregistered animation '{}'", id);
        }
        removed
    }

    /// Pause or resume dispatch without dropping the entry.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Apply mutations queued through handles and registrations.
    pub fn apply_pending(&mut self) {
        while let Ok(command) = self.receiver.try_recv() {
            match command {
                Command::Register {
                    id,
                    priority,
                    rate,
                    callback,
                    generation,
                } => self.insert(id, priority, rate, callback, generation),
                Command::Unregister { id, generation } => {
                    let matches = match (self.entries.get(&id), generation) {
                        (Some(entry), Some(generation)) => entry.generation == generation,
                        (Some(_), None) => true,
                        (None, _) => false,
                    };
                    if matches {
                        self.unregister(&id);
                    }
                }
                Command::SetEnabled { id, enabled } => {
                    self.set_enabled(&id, enabled);
                }
            }
        }
    }

    /// Run one frame. Returns how many callbacks were dispatched.
    ///
    /// The id list is captured up front; callbacks that register new work
    /// see it start on the next tick. A failing or panicking callback is
    /// logged and does not stop the others.
    pub fn tick(&mut self, ctx: &FrameContext) -> usize {
        self.apply_pending();
        self.frame_count += 1;

        let ids: Vec<String> = self.entries.keys().cloned().collect();
        let mut dispatched = 0;

        for id in ids {
            self.apply_pending();

            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if !entry.enabled {
                continue;
            }
            let interval = frame_interval(entry.effective_rate(&self.rates));
            if self.frame_count % interval != 0 {
                continue;
            }

            let callback = &mut entry.callback;
            let result = panic::catch_unwind(AssertUnwindSafe(|| callback(ctx)));
            entry.stats.dispatches += 1;
            dispatched += 1;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    entry.stats.failures += 1;
                    warn!("Animation '{}' failed: {:#}", id, err);
                }
                Err(_) => {
                    entry.stats.failures += 1;
                    error!("Animation '{}' panicked during update", id);
                }
            }
        }

        self.apply_pending();
        dispatched
    }

    /// Replace all three priority rates at once.
    pub fn set_rates(&mut self, rates: RateTable) {
        if rates != self.rates {
            info!(
                "Animation rates now high={}Hz medium={}Hz low={}Hz",
                rates.high, rates.medium, rates.low
            );
            self.rates = rates;
        }
    }

    /// Pick the rate table for the FPS band `fps` falls in.
    pub fn adjust_for_fps(&mut self, fps: f32) {
        if fps.is_finite() {
            self.set_rates(RateTable::for_fps(fps));
        }
    }

    pub fn rates(&self) -> RateTable {
        self.rates
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_enabled(&self, id: &str) -> Option<bool> {
        self.entries.get(id).map(|e| e.enabled)
    }

    pub fn stats(&self, id: &str) -> Option<EntryStats> {
        self.entries.get(id).map(|e| e.stats)
    }

    fn insert(
        &mut self,
        id: String,
        priority: Priority,
        rate: Option<f32>,
        callback: UpdateFn,
        generation: u64,
    ) {
        let entry = Entry {
            callback,
            priority,
            rate,
            enabled: true,
            generation,
            stats: EntryStats::default(),
        };
        if self.entries.insert(id.clone(), entry).is_some() {
            warn!("Animation '{}' was registered twice; keeping the newest", id);
        } else {
            debug!("Registered animation '{}' ({:?})", id, priority);
        }
    }
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn ctx(frame: u64) -> FrameContext {
        FrameContext::new(
            frame as f64 * 1000.0 / 60.0,
            1.0 / 60.0,
            Arc::new(AudioSnapshot::silent(16)),
        )
    }

    fn counter() -> (Rc<Cell<u32>>, impl FnMut(&FrameContext) -> anyhow::Result<()>) {
        let count = Rc::new(Cell::new(0));
        let inner = count.clone();
        (count, move |_: &FrameContext| {
            inner.set(inner.get() + 1);
            Ok(())
        })
    }

    fn run(scheduler: &mut AnimationScheduler, frames: u64) {
        for frame in 1..=frames {
            scheduler.tick(&ctx(frame));
        }
    }

    #[test]
    fn test_thirty_hz_runs_every_other_tick() {
        let mut scheduler = AnimationScheduler::new();
        let frames = Rc::new(RefCell::new(Vec::new()));
        let seen = frames.clone();
        let frame_no = Rc::new(Cell::new(0u64));
        let tick_no = frame_no.clone();
        let _reg = scheduler
            .register("half", Priority::High, Some(30.0), move |_| {
                seen.borrow_mut().push(tick_no.get());
                Ok(())
            })
            .unwrap();

        for frame in 1..=60 {
            frame_no.set(frame);
            scheduler.tick(&ctx(frame));
        }

        let frames = frames.borrow();
        assert_eq!(frames.len(), 30);
        assert!(frames.iter().all(|f| f % 2 == 0));
    }

    #[test]
    fn test_default_rates_follow_priority() {
        let mut scheduler = AnimationScheduler::new();
        let (high, cb_high) = counter();
        let (medium, cb_medium) = counter();
        let (low, cb_low) = counter();
        let _a = scheduler.register("high", Priority::High, None, cb_high).unwrap();
        let _b = scheduler.register("medium", Priority::Medium, None, cb_medium).unwrap();
        let _c = scheduler.register("low", Priority::Low, None, cb_low).unwrap();

        run(&mut scheduler, 60);

        assert_eq!(high.get(), 60);
        assert_eq!(medium.get(), 30);
        assert_eq!(low.get(), 15);
    }

    #[test]
    fn test_explicit_rate_is_honoured() {
        let mut scheduler = AnimationScheduler::new();
        let (count, cb) = counter();
        let _reg = scheduler.register("fx", Priority::Medium, Some(60.0), cb).unwrap();
        run(&mut scheduler, 60);
        assert_eq!(count.get(), 60);
    }

    #[test]
    fn test_explicit_rate_scales_with_preset() {
        let mut scheduler = AnimationScheduler::with_rates(PerformancePreset::Potato.rates());
        let (count, cb) = counter();
        // Medium drops 30 -> 10 Hz, so 60 Hz becomes 20 Hz
        let _reg = scheduler.register("fx", Priority::Medium, Some(60.0), cb).unwrap();
        run(&mut scheduler, 60);
        assert_eq!(count.get(), 20);
    }

    #[test]
    fn test_failing_callback_is_isolated() {
        let mut scheduler = AnimationScheduler::new();
        let _bad = scheduler
            .register("broken", Priority::High, None, |_| anyhow::bail!("mesh missing"))
            .unwrap();
        let (good, cb) = counter();
        let _good = scheduler.register("healthy", Priority::High, None, cb).unwrap();

        run(&mut scheduler, 60);

        assert_eq!(good.get(), 60);
        assert_eq!(
            scheduler.stats("broken"),
            Some(EntryStats {
                dispatches: 60,
                failures: 60
            })
        );
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let mut scheduler = AnimationScheduler::new();
        let _bad = scheduler
            .register("panics", Priority::High, None, |_| panic!("boom"))
            .unwrap();
        let (good, cb) = counter();
        let _good = scheduler.register("healthy", Priority::High, None, cb).unwrap();

        run(&mut scheduler, 3);
        assert_eq!(good.get(), 3);
        assert_eq!(scheduler.stats("panics").unwrap().failures, 3);
    }

    #[test]
    fn test_register_overwrites_same_id() {
        let mut scheduler = AnimationScheduler::new();
        let (first, cb_first) = counter();
        let (second, cb_second) = counter();
        let stale = scheduler.register("fx", Priority::High, None, cb_first).unwrap();
        let _fresh = scheduler.register("fx", Priority::High, None, cb_second).unwrap();
        assert_eq!(scheduler.len(), 1);

        // The old handle must not remove the newer registration
        stale.unregister();
        run(&mut scheduler, 5);

        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 5);
        assert!(scheduler.contains("fx"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut scheduler = AnimationScheduler::new();
        let (_, cb) = counter();
        let reg = scheduler.register("fx", Priority::Medium, None, cb).unwrap();
        assert!(scheduler.unregister("fx"));
        assert!(!scheduler.unregister("fx"));
        assert!(!scheduler.unregister("never-registered"));
        reg.unregister();
        scheduler.apply_pending();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let mut scheduler = AnimationScheduler::new();
        let (count, cb) = counter();
        let _reg = scheduler.register("fx", Priority::High, None, cb).unwrap();

        run(&mut scheduler, 10);
        assert!(scheduler.set_enabled("fx", false));
        run(&mut scheduler, 10);
        assert!(scheduler.set_enabled("fx", true));
        run(&mut scheduler, 10);

        assert_eq!(count.get(), 20);
        assert!(!scheduler.set_enabled("missing", false));
    }

    #[test]
    fn test_mutations_during_tick() {
        let mut scheduler = AnimationScheduler::new();
        let handle = scheduler.handle();
        let (child, child_cb) = counter();
        let child_cb = RefCell::new(Some(child_cb));

        // Spawns a child on its first run, then removes itself
        let own = Rc::new(RefCell::new(None::<Registration>));
        let own_inner = own.clone();
        let reg = scheduler
            .register("spawner", Priority::High, None, move |_| {
                if let Some(cb) = child_cb.borrow_mut().take() {
                    let _child = handle.register("child", Priority::High, None, cb)?;
                }
                if let Some(me) = own_inner.borrow_mut().take() {
                    me.unregister();
                }
                Ok(())
            })
            .unwrap();
        *own.borrow_mut() = Some(reg);

        scheduler.tick(&ctx(1));
        assert!(scheduler.contains("child"));
        assert!(!scheduler.contains("spawner"));
        assert_eq!(child.get(), 0);

        scheduler.tick(&ctx(2));
        assert_eq!(child.get(), 1);
    }

    #[test]
    fn test_disable_mid_tick_applies_before_next_dispatch() {
        let mut scheduler = AnimationScheduler::new();
        let handle = scheduler.handle();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        let _a = scheduler.register("a", Priority::High, None, cb_a).unwrap();
        let _b = scheduler.register("b", Priority::High, None, cb_b).unwrap();

        // Whichever runs first disables the other
        let _gate = scheduler
            .register("gate", Priority::High, None, move |_| {
                handle.set_enabled("a", false);
                handle.set_enabled("b", false);
                Ok(())
            })
            .unwrap();

        run(&mut scheduler, 3);
        // Each of a/b can only have run in frame 1 before the gate fired
        assert!(a.get() <= 1);
        assert!(b.get() <= 1);
        assert_eq!(scheduler.is_enabled("a"), Some(false));
    }

    #[test]
    fn test_invalid_rates_are_rejected() {
        let mut scheduler = AnimationScheduler::new();
        for rate in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            let err = scheduler
                .register("fx", Priority::High, Some(rate), |_| Ok(()))
                .err()
                .unwrap();
            assert!(matches!(err, SchedulerError::InvalidRate { .. }));
        }
        assert_eq!(
            scheduler.register("", Priority::High, None, |_| Ok(())).err(),
            Some(SchedulerError::EmptyId)
        );
    }

    #[test]
    fn test_adjust_for_fps_bands() {
        let mut scheduler = AnimationScheduler::new();
        scheduler.adjust_for_fps(58.0);
        assert_eq!(scheduler.rates(), RateTable::new(60.0, 30.0, 15.0));
        scheduler.adjust_for_fps(50.0);
        assert_eq!(scheduler.rates(), RateTable::new(60.0, 20.0, 10.0));
        scheduler.adjust_for_fps(40.0);
        assert_eq!(scheduler.rates(), RateTable::new(30.0, 15.0, 10.0));
        scheduler.adjust_for_fps(20.0);
        assert_eq!(scheduler.rates(), RateTable::new(30.0, 10.0, 5.0));
        scheduler.adjust_for_fps(f32::NAN);
        assert_eq!(scheduler.rates(), RateTable::new(30.0, 10.0, 5.0));
    }

    #[test]
    fn test_rate_change_applies_to_existing_entries() {
        let mut scheduler = AnimationScheduler::new();
        let (count, cb) = counter();
        let _reg = scheduler.register("fx", Priority::Medium, None, cb).unwrap();
        scheduler.adjust_for_fps(20.0);
        run(&mut scheduler, 60);
        // 10 Hz => every 6th frame
        assert_eq!(count.get(), 10);
    }
}

use glam::Vec3;

use super::{Effect, EffectInputs};
use crate::animation::{FrameContext, Priority};

const GRAVITY: f32 = 9.8;
const GOLDEN_ANGLE: f32 = 2.399_963;

#[derive(Debug, Clone, PartialEq)]
pub struct Spark {
    pub position: Vec3,
    pub velocity: Vec3,
    pub life: f32,
}

/// Full-screen flash on each beat plus a burst of sparks when the quality
/// budget allows particles.
pub struct BeatFlash {
    inputs: EffectInputs,
    intensity: f32,
    decay: f32,
    origin: Vec3,
    burst: usize,
    spark_life: f32,
    sparks: Vec<Spark>,
    flashes: u64,
}

impl BeatFlash {
    pub fn new(burst: usize) -> Self {
        Self {
            inputs: EffectInputs::default(),
            intensity: 0.0,
            decay: 8.0,
            origin: Vec3::new(0.0, 2.0, -5.0),
            burst,
            spark_life: 1.2,
            sparks: Vec::new(),
            flashes: 0,
        }
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn sparks(&self) -> &[Spark] {
        &self.sparks
    }

    pub fn flashes(&self) -> u64 {
        self.flashes
    }

    fn spawn_sparks(&mut self, budget: usize) {
        let room = budget.saturating_sub(self.sparks.len());
        let speed = 3.0 + 4.0 * self.inputs.bass;
        for i in 0..self.burst.min(room) {
            let angle = (self.flashes as f32 + i as f32) * GOLDEN_ANGLE;
            self.sparks.push(Spark {
                position: self.origin,
                velocity: Vec3::new(angle.cos(), 1.5, angle.sin()) * speed,
                life: self.spark_life,
            });
        }
    }
}

impl Default for BeatFlash {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Effect for BeatFlash {
    fn id(&self) -> &str {
        "beat-flash"
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    fn update(&mut self, ctx: &FrameContext) -> anyhow::Result<()> {
        self.inputs.update_inputs(&ctx.audio, ctx.now_ms);
        let dt = self.inputs.delta_seconds;

        for spark in &mut self.sparks {
            spark.velocity.y -= GRAVITY * dt;
            spark.position += spark.velocity * dt;
            spark.life -= dt;
        }
        self.sparks.retain(|s| s.life > 0.0);

        let budget = if ctx.quality.particles {
            ctx.quality.max_particles
        } else {
            0
        };
        self.sparks.truncate(budget);

        if self.inputs.beat {
            self.flashes += self.inputs.new_beats;
            self.intensity = 1.0;
            self.spawn_sparks(budget);
        } else {
            self.intensity *= (-self.decay * dt).exp();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationScheduler;
    use crate::audio::AudioSnapshot;
    use crate::effects::EffectHandle;
    use crate::performance::PerformancePreset;
    use std::sync::Arc;

    fn ctx(
        now_ms: f64,
        beat: bool,
        beat_count: u64,
        sequence: u64,
        preset: PerformancePreset,
    ) -> FrameContext {
        let snapshot = AudioSnapshot {
            bass: 0.8,
            beat_detected: beat,
            beat_count,
            is_playing: true,
            sequence,
            ..AudioSnapshot::silent(8)
        };
        FrameContext::new(now_ms, 1.0 / 60.0, Arc::new(snapshot)).with_quality(preset.quality())
    }

    #[test]
    fn test_beat_triggers_flash_and_sparks() {
        let mut flash = BeatFlash::new(16);
        flash.update(&ctx(0.0, true, 1, 1, PerformancePreset::High)).unwrap();
        assert_eq!(flash.intensity(), 1.0);
        assert_eq!(flash.flashes(), 1);
        assert_eq!(flash.sparks().len(), 16);
    }

    #[test]
    fn test_flash_decays_between_beats() {
        let mut flash = BeatFlash::new(16);
        flash.update(&ctx(0.0, true, 1, 1, PerformancePreset::High)).unwrap();
        flash.update(&ctx(100.0, false, 1, 2, PerformancePreset::High)).unwrap();
        assert!(flash.intensity() < 0.5);
        assert!(flash.sparks().iter().all(|s| s.position != Vec3::new(0.0, 2.0, -5.0)));
    }

    #[test]
    fn test_no_sparks_without_particle_budget() {
        let mut flash = BeatFlash::new(16);
        flash.update(&ctx(0.0, true, 1, 1, PerformancePreset::Potato)).unwrap();
        assert_eq!(flash.intensity(), 1.0);
        assert!(flash.sparks().is_empty());
    }

    #[test]
    fn test_sparks_respect_budget_and_expire() {
        let mut flash = BeatFlash::new(400);
        flash.update(&ctx(0.0, true, 1, 1, PerformancePreset::High)).unwrap();
        assert_eq!(flash.sparks().len(), 400);

        flash.update(&ctx(16.0, false, 1, 2, PerformancePreset::Potato)).unwrap();
        assert!(flash.sparks().is_empty());

        flash.update(&ctx(32.0, true, 2, 3, PerformancePreset::Low)).unwrap();
        assert_eq!(flash.sparks().len(), 400);
        flash.update(&ctx(2000.0, false, 2, 4, PerformancePreset::Low)).unwrap();
        assert!(flash.sparks().is_empty());
    }

    #[test]
    fn test_potato_rate_flash_counts_every_beat() {
        let preset = PerformancePreset::Potato;
        let mut scheduler = AnimationScheduler::with_rates(preset.rates());
        let handle = EffectHandle::attach(BeatFlash::new(8), &mut scheduler).unwrap();

        // High priority runs every second frame here; a beat lands on every
        // seventh frame, so half of them fall on frames the flash skips
        let mut dispatched = 0;
        for frame in 0..60u64 {
            let beat = frame > 0 && frame % 7 == 0;
            let ctx = ctx(frame as f64 * 1000.0 / 60.0, beat, frame / 7, frame, preset);
            dispatched += scheduler.tick(&ctx);
        }

        assert_eq!(dispatched, 30);
        assert_eq!(handle.state().flashes(), 8);
        handle.detach();
    }
}

//! Per-frame hand-off between the audio session, the quality controller and
//! the animation scheduler.

use glam::Vec3;
use log::debug;
use std::sync::Arc;

use crate::animation::{AnimationScheduler, FrameContext};
use crate::audio::{AudioOutput, AudioSession, AudioSnapshot};
use crate::config::VisualizerConfig;
use crate::performance::{PerformancePreset, QualityController};

/// What one `frame` call did.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// The snapshot every callback of this frame saw
    pub snapshot: Arc<AudioSnapshot>,
    pub dispatched: usize,
    pub preset_change: Option<PerformancePreset>,
}

/// Runs the visualizer one frame at a time.
///
/// Order per frame: pulse the session, record the frame time, let the
/// quality controller react, then tick the scheduler with the snapshot the
/// pulse just published. Callbacks of frame N therefore always see the
/// audio of frame N.
pub struct FrameDriver<O: AudioOutput> {
    session: AudioSession<O>,
    scheduler: AnimationScheduler,
    quality: QualityController,
    camera: Vec3,
    last_frame_ms: Option<f64>,
}

impl<O: AudioOutput> FrameDriver<O> {
    pub fn new(output: O, config: &VisualizerConfig) -> Self {
        let quality = QualityController::new(&config.performance);
        Self {
            session: AudioSession::new(output, config),
            scheduler: AnimationScheduler::with_rates(quality.rates()),
            quality,
            camera: Vec3::ZERO,
            last_frame_ms: None,
        }
    }

    pub fn frame(&mut self, now_ms: f64) -> FrameReport {
        let delta_seconds = match self.last_frame_ms {
            Some(last) if now_ms > last => ((now_ms - last) / 1000.0) as f32,
            _ => 0.0,
        };
        self.last_frame_ms = Some(now_ms);

        let snapshot = self
            .session
            .pulse(now_ms)
            .unwrap_or_else(|| self.session.snapshot());

        self.quality.record_frame(delta_seconds);
        let preset_change = self.quality.update(now_ms / 1000.0);
        if let Some(preset) = preset_change {
            self.scheduler.set_rates(preset.rates());
        }

        let ctx = FrameContext::new(now_ms, delta_seconds, snapshot.clone())
            .with_camera(self.camera)
            .with_quality(self.quality.quality());
        let dispatched = self.scheduler.tick(&ctx);

        if self.scheduler.frame_count() % 600 == 0 {
            debug!(
                "Frame {}: {:.1} FPS avg, preset {}, {} animations",
                self.scheduler.frame_count(),
                self.quality.monitor().average_fps(),
                self.quality.preset(),
                self.scheduler.len()
            );
        }

        FrameReport {
            snapshot,
            dispatched,
            preset_change,
        }
    }

    /// Pin a preset and push its rates to the scheduler immediately.
    pub fn set_preset(&mut self, preset: PerformancePreset) {
        self.quality.set_manual(preset);
        self.scheduler.set_rates(preset.rates());
    }

    pub fn set_auto_quality(&mut self) {
        self.quality.set_auto();
    }

    pub fn set_camera(&mut self, camera: Vec3) {
        self.camera = camera;
    }

    pub fn session(&self) -> &AudioSession<O> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AudioSession<O> {
        &mut self.session
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut AnimationScheduler {
        &mut self.scheduler
    }

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }
}

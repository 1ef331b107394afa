use log::{info, warn};

use super::{ComponentQuality, PerformanceMonitor, PerformancePreset};
use crate::animation::RateTable;
use crate::config::PerformanceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    /// Follow the measured frame rate
    Auto,
    /// Hold the user's preset regardless of frame rate
    Manual,
}

/// Picks a preset from the monitor's average, at most once per cooldown.
#[derive(Debug, Clone)]
pub struct QualityController {
    monitor: PerformanceMonitor,
    mode: QualityMode,
    preset: PerformancePreset,
    min_samples: usize,
    cooldown_secs: f64,
    target_fps: f32,
    last_change: Option<f64>,
}

impl QualityController {
    pub fn new(config: &PerformanceConfig) -> Self {
        let controller = Self {
            monitor: PerformanceMonitor::new(config.fps_window),
            mode: if config.auto {
                QualityMode::Auto
            } else {
                QualityMode::Manual
            },
            preset: config.preset,
            min_samples: config.min_samples,
            cooldown_secs: config.cooldown_secs,
            target_fps: config.target_fps,
            last_change: None,
        };
        controller.warn_if_capped();
        controller
    }

    /// Best preset automatic mode can reach when frames arrive at the
    /// target rate.
    pub fn auto_ceiling(&self) -> PerformancePreset {
        PerformancePreset::for_fps(self.target_fps)
    }

    fn warn_if_capped(&self) {
        if self.mode == QualityMode::Auto && self.auto_ceiling() == PerformancePreset::Potato {
            warn!(
                "Target {} FPS is below every quality band; automatic quality will stay on {}",
                self.target_fps,
                PerformancePreset::Potato
            );
        }
    }

    pub fn record_frame(&mut self, delta_seconds: f32) {
        self.monitor.record_frame(delta_seconds);
    }

    pub fn record_fps(&mut self, fps: f32) {
        self.monitor.record_fps(fps);
    }

    /// Re-evaluate the preset at `now_secs`. Returns the new preset when it
    /// changed.
    pub fn update(&mut self, now_secs: f64) -> Option<PerformancePreset> {
        if self.mode == QualityMode::Manual || self.monitor.sample_count() < self.min_samples {
            return None;
        }
        if let Some(last) = self.last_change {
            if now_secs - last < self.cooldown_secs {
                return None;
            }
        }

        let fps = self.monitor.average_fps();
        let target = PerformancePreset::for_fps(fps);
        if target == self.preset {
            return None;
        }

        info!(
            "Average {:.1} FPS, switching quality {} -> {}",
            fps, self.preset, target
        );
        self.preset = target;
        self.last_change = Some(now_secs);
        Some(target)
    }

    /// Pin `preset` and stop adapting.
    pub fn set_manual(&mut self, preset: PerformancePreset) {
        info!("Quality pinned to {}", preset);
        self.mode = QualityMode::Manual;
        self.preset = preset;
    }

    pub fn set_auto(&mut self) {
        if self.mode != QualityMode::Auto {
            info!("Quality back on automatic");
            self.mode = QualityMode::Auto;
            self.warn_if_capped();
        }
    }

    pub fn mode(&self) -> QualityMode {
        self.mode
    }

    pub fn preset(&self) -> PerformancePreset {
        self.preset
    }

    pub fn quality(&self) -> ComponentQuality {
        self.preset.quality()
    }

    pub fn rates(&self) -> RateTable {
        self.preset.rates()
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(&PerformanceConfig::default())
    }
}

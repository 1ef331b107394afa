//! Visualizer configuration.
//!
//! Every section has defaults so a partial JSON file only overrides what it
//! names. The beat constants in particular are tuned for feel, not derived,
//! so they live here instead of being hard-coded in the detector.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::{AnalyzerConfig, BandRanges, BeatConfig};
use crate::error::ConfigError;
use crate::performance::PerformancePreset;

/// Top-level configuration shared by the binaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub analyzer: AnalyzerConfig,
    pub bands: BandRanges,
    pub beat: BeatConfig,
    pub performance: PerformanceConfig,
    pub audio: AudioConfig,
}

/// Adaptive quality settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Let the controller pick presets from measured FPS
    pub auto: bool,
    /// Preset used at start-up, and permanently when `auto` is off
    pub preset: PerformancePreset,
    /// Rolling FPS window length
    pub fps_window: usize,
    /// Readings required before the controller acts
    pub min_samples: usize,
    /// Minimum seconds between two preset changes
    pub cooldown_secs: f64,
    /// Frame rate the driver paces itself to
    pub target_fps: f32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            auto: true,
            preset: PerformancePreset::High,
            fps_window: 30,
            min_samples: 10,
            cooldown_secs: 3.0,
            target_fps: 60.0,
        }
    }
}

/// Playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub volume: f32,
    /// Deadline for decode + metadata on load
    pub load_timeout_secs: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 0.8,
            load_timeout_secs: 10.0,
        }
    }
}

impl VisualizerConfig {
    /// Load and validate a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fft_size = self.analyzer.fft_size;
        if !fft_size.is_power_of_two() || !(32..=32768).contains(&fft_size) {
            return Err(invalid(
                "analyzer.fft_size",
                format!("{fft_size} is not a power of two in 32..=32768"),
            ));
        }
        if !(0.0..=1.0).contains(&self.analyzer.smoothing_time_constant) {
            return Err(invalid(
                "analyzer.smoothing_time_constant",
                format!("{} is outside [0, 1]", self.analyzer.smoothing_time_constant),
            ));
        }
        if !(self.analyzer.min_decibels < self.analyzer.max_decibels) {
            return Err(invalid(
                "analyzer.min_decibels",
                "must be below max_decibels".to_string(),
            ));
        }
        if self.beat.history_len == 0 {
            return Err(invalid("beat.history_len", "must be at least 1".to_string()));
        }
        if !self.beat.threshold_multiplier.is_finite() || !self.beat.energy_floor.is_finite() {
            return Err(invalid("beat", "thresholds must be finite".to_string()));
        }
        if self.performance.fps_window == 0 {
            return Err(invalid(
                "performance.fps_window",
                "must be at least 1".to_string(),
            ));
        }
        if !(self.performance.target_fps > 0.0 && self.performance.target_fps.is_finite()) {
            return Err(invalid(
                "performance.target_fps",
                format!("{} is not a positive frame rate", self.performance.target_fps),
            ));
        }
        if !(self.performance.cooldown_secs >= 0.0) {
            return Err(invalid(
                "performance.cooldown_secs",
                "must be zero or positive".to_string(),
            ));
        }
        if !(self.audio.load_timeout_secs > 0.0) {
            return Err(invalid(
                "audio.load_timeout_secs",
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

use serde::{Deserialize, Serialize};

/// Tunables for the bass onset heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Ring buffer length in analysis ticks (~0.5s at 60 Hz)
    pub history_len: usize,
    /// A beat needs bass above `average * threshold_multiplier`
    pub threshold_multiplier: f32,
    /// Absolute floor so near-silence never fires
    pub energy_floor: f32,
    /// Debounce between beats
    pub min_interval_ms: f64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            history_len: 30,
            threshold_multiplier: 1.4,
            energy_floor: 0.3,
            min_interval_ms: 100.0,
        }
    }
}

/// Fixed-capacity ring of recent bass samples. Starts zero-filled and is
/// never resized.
#[derive(Debug, Clone)]
struct BeatHistory {
    samples: Vec<f32>,
    cursor: usize,
}

impl BeatHistory {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            cursor: 0,
        }
    }

    fn push(&mut self, value: f32) {
        self.samples[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.samples.len();
    }

    fn average(&self) -> f32 {
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.cursor = 0;
    }
}

/// Edge-triggered bass beat detector with an adaptive threshold.
pub struct BeatDetector {
    config: BeatConfig,
    history: BeatHistory,
    last_beat_ms: f64,
}

impl BeatDetector {
    pub fn new(config: BeatConfig) -> Self {
        let history = BeatHistory::new(config.history_len);
        Self {
            config,
            history,
            last_beat_ms: f64::NEG_INFINITY,
        }
    }

    /// Feed one bass sample taken at `now_ms`; true when it is a new beat.
    ///
    /// Non-finite input is dropped without touching the history.
    pub fn detect_beat(&mut self, bass_level: f32, now_ms: f64) -> bool {
        if !bass_level.is_finite() || !now_ms.is_finite() {
            return false;
        }

        self.history.push(bass_level);

        let average = self.history.average();
        let threshold = average * self.config.threshold_multiplier;
        let can_beat = now_ms - self.last_beat_ms > self.config.min_interval_ms;

        let beat_detected =
            can_beat && bass_level > threshold && bass_level > self.config.energy_floor;

        if beat_detected {
            self.last_beat_ms = now_ms;
        }

        beat_detected
    }

    /// Forget history and the last beat time.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_beat_ms = f64::NEG_INFINITY;
    }

    pub fn config(&self) -> &BeatConfig {
        &self.config
    }

    pub fn history_len(&self) -> usize {
        self.history.samples.len()
    }
}

impl Default for BeatDetector {
    fn default() -> Self {
        Self::new(BeatConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_MS: f64 = 1000.0 / 60.0;

    #[test]
    fn test_spike_after_quiet_is_a_beat() {
        let mut detector = BeatDetector::default();
        for i in 0..30 {
            assert!(!detector.detect_beat(0.1, i as f64 * FRAME_MS));
        }
        assert!(detector.detect_beat(0.9, 30.0 * FRAME_MS));
    }

    #[test]
    fn test_debounce_blocks_second_spike_within_window() {
        let mut detector = BeatDetector::default();
        for i in 0..30 {
            detector.detect_beat(0.05, i as f64 * 10.0);
        }

        let first = detector.detect_beat(0.9, 1000.0);
        detector.detect_beat(0.05, 1025.0);
        let second = detector.detect_beat(0.95, 1050.0);

        assert!(first);
        assert!(!second);

        // Past the debounce window another spike fires again
        for i in 0..5 {
            detector.detect_beat(0.05, 1060.0 + i as f64 * 10.0);
        }
        assert!(detector.detect_beat(0.95, 1200.0));
    }

    #[test]
    fn test_floor_blocks_quiet_fluctuations() {
        let mut detector = BeatDetector::default();
        let mut now = 0.0;
        for _ in 0..120 {
            assert!(!detector.detect_beat(0.2, now));
            now += FRAME_MS;
        }
        // Above the adaptive threshold (0.28) but below the 0.3 floor
        for level in [0.285, 0.29, 0.295, 0.299] {
            assert!(!detector.detect_beat(level, now));
            now += 200.0;
        }
    }

    #[test]
    fn test_constant_loud_signal_fires_only_during_warm_up() {
        let mut detector = BeatDetector::default();
        let mut beats = 0;
        for i in 0..300 {
            if detector.detect_beat(0.8, i as f64 * FRAME_MS) {
                beats += 1;
            }
        }
        // Once the ring is full the average equals the signal and nothing exceeds 1.4x
        assert!(beats > 0);
        let mut late_beats = 0;
        for i in 300..600 {
            if detector.detect_beat(0.8, i as f64 * FRAME_MS) {
                late_beats += 1;
            }
        }
        assert_eq!(late_beats, 0);
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut detector = BeatDetector::default();
        for i in 0..30 {
            detector.detect_beat(0.1, i as f64 * FRAME_MS);
        }
        assert!(!detector.detect_beat(f32::NAN, 600.0));
        assert!(!detector.detect_beat(f32::INFINITY, 620.0));
        assert!(!detector.detect_beat(0.9, f64::NAN));
        // History still holds 0.1s so a real spike is detected normally
        assert!(detector.detect_beat(0.9, 640.0));
    }

    #[test]
    fn test_history_is_fixed_capacity() {
        let mut detector = BeatDetector::new(BeatConfig {
            history_len: 8,
            ..BeatConfig::default()
        });
        for i in 0..100 {
            detector.detect_beat(0.5, i as f64);
        }
        assert_eq!(detector.history_len(), 8);
    }

    #[test]
    fn test_reset_clears_debounce() {
        let mut detector = BeatDetector::default();
        assert!(detector.detect_beat(0.9, 0.0));
        detector.reset();
        assert!(detector.detect_beat(0.9, 10.0));
    }
}

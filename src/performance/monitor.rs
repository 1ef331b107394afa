use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 30;

/// Rolling window of frame-rate readings.
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    samples: VecDeque<f32>,
    window: usize,
}

impl PerformanceMonitor {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Push one FPS reading, evicting the oldest when the window is full.
    /// Non-finite and negative readings are dropped.
    pub fn record_fps(&mut self, fps: f32) {
        if !fps.is_finite() || fps < 0.0 {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
    }

    /// Record a frame that took `delta_seconds`.
    pub fn record_frame(&mut self, delta_seconds: f32) {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.record_fps(1.0 / delta_seconds);
        }
    }

    /// Mean of the window; 0 before the first reading.
    pub fn average_fps(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_zero() {
        let monitor = PerformanceMonitor::default();
        assert_eq!(monitor.average_fps(), 0.0);
        assert_eq!(monitor.sample_count(), 0);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut monitor = PerformanceMonitor::new(3);
        for fps in [10.0, 20.0, 30.0, 40.0] {
            monitor.record_fps(fps);
        }
        assert_eq!(monitor.sample_count(), 3);
        assert_eq!(monitor.average_fps(), 30.0);
    }

    #[test]
    fn test_frame_deltas() {
        let mut monitor = PerformanceMonitor::new(4);
        monitor.record_frame(0.02);
        monitor.record_frame(0.0);
        monitor.record_frame(-1.0);
        monitor.record_frame(f32::NAN);
        monitor.record_fps(f32::INFINITY);
        assert_eq!(monitor.sample_count(), 1);
        assert!((monitor.average_fps() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_window_holds_one_sample() {
        let mut monitor = PerformanceMonitor::new(0);
        monitor.record_fps(30.0);
        monitor.record_fps(60.0);
        assert_eq!(monitor.window(), 1);
        assert_eq!(monitor.average_fps(), 60.0);
    }
}

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Frequency transform settings, modelled on a browser analyser node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Transform size in samples, a power of two. Produces `fft_size / 2` bins.
    pub fft_size: usize,
    /// Exponential averaging between frames (0 = none, 1 = frozen)
    pub smoothing_time_constant: f32,
    /// Decibel level mapped to byte 0
    pub min_decibels: f32,
    /// Decibel level mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Windowed FFT with inter-frame smoothing that emits byte magnitudes.
///
/// The plan and window are built once; `reset` only clears the smoothing
/// state so the same analyser can serve every loaded track.
pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            window: Self::hann_window(fft_size),
            smoothed: vec![0.0; fft_size / 2],
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            fft,
            config: AnalyzerConfig { fft_size, ..config },
        }
    }

    fn hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyse the most recent `fft_size` samples of `samples` (zero padded
    /// at the front when shorter) and return one byte per bin.
    pub fn frequency_data(&mut self, samples: &[f32]) -> Vec<u8> {
        let fft_size = self.config.fft_size;
        let tail = &samples[samples.len().saturating_sub(fft_size)..];
        let pad = fft_size - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { tail[i - pad] };
            let sample = if sample.is_finite() { sample } else { 0.0 };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let tau = self.config.smoothing_time_constant;
        let db_range = self.config.max_decibels - self.config.min_decibels;

        self.buffer[..fft_size / 2]
            .iter()
            .zip(self.smoothed.iter_mut())
            .map(|(c, smoothed)| {
                let magnitude = c.norm() / fft_size as f32;
                *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

                let db = 20.0 * smoothed.log10();
                let scaled = 255.0 * (db - self.config.min_decibels) / db_range;
                if scaled.is_nan() {
                    0
                } else {
                    scaled.clamp(0.0, 255.0) as u8
                }
            })
            .collect()
    }

    /// Drop the smoothing memory, e.g. when a new source is attached.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default());
        let data = analyzer.frequency_data(&vec![0.0; 4096]);
        assert_eq!(data.len(), 1024);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_output_length_is_half_transform() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig {
            fft_size: 512,
            ..AnalyzerConfig::default()
        });
        assert_eq!(analyzer.frequency_data(&[0.5; 100]).len(), 256);
        assert_eq!(analyzer.frequency_data(&[0.5; 10_000]).len(), 256);
    }

    #[test]
    fn test_tone_peaks_in_its_bin() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig {
            smoothing_time_constant: 0.0,
            ..AnalyzerConfig::default()
        });
        // 44.1kHz / 2048 = ~21.5 Hz per bin, 1kHz lands near bin 46
        let data = analyzer.frequency_data(&sine(1000.0, 44100.0, 2048));
        let peak = data
            .iter()
            .enumerate()
            .max_by_key(|&(_, b)| *b)
            .map(|(i, _)| i)
            .unwrap();
        assert!((45..=48).contains(&peak), "peak at bin {peak}");
        assert!(data[peak] > 200);
        assert!(data[900] < data[peak]);
    }

    #[test]
    fn test_smoothing_decays_gradually() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default());
        let tone = sine(1000.0, 44100.0, 2048);
        for _ in 0..20 {
            analyzer.frequency_data(&tone);
        }
        let loud = analyzer.frequency_data(&tone)[46];
        let after_one_silent_frame = analyzer.frequency_data(&[0.0; 2048])[46];
        assert!(after_one_silent_frame > 0);
        assert!(after_one_silent_frame <= loud);

        analyzer.reset();
        assert_eq!(analyzer.frequency_data(&[0.0; 2048])[46], 0);
    }

    #[test]
    fn test_non_finite_samples_are_silenced() {
        let mut analyzer = SpectrumAnalyzer::new(AnalyzerConfig::default());
        let data = analyzer.frequency_data(&vec![f32::NAN; 2048]);
        assert!(data.iter().all(|&b| b == 0));
    }
}

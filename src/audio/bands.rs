use serde::{Deserialize, Serialize};

/// Normalized band energies, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrequencyBands {
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
    pub overall: f32,
}

/// Band edges in Hz. Highs run from `highs_start` up to Nyquist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandRanges {
    pub bass: (f32, f32),
    pub mids: (f32, f32),
    pub highs_start: f32,
}

impl Default for BandRanges {
    fn default() -> Self {
        Self {
            bass: (20.0, 250.0),
            mids: (250.0, 4000.0),
            highs_start: 4000.0,
        }
    }
}

/// Reduce one frame of byte magnitudes into band scalars.
///
/// Bins are located with `floor(hz / nyquist * bin_count)` where
/// `bin_count = fft_size / 2`, then clamped to the data length. Each band is
/// the mean byte value of its `[start, end)` range divided by 255; an empty
/// range is 0.
pub fn extract_bands(
    frequency_data: &[u8],
    sample_rate: f32,
    fft_size: usize,
    ranges: &BandRanges,
) -> FrequencyBands {
    let nyquist = sample_rate / 2.0;
    let bin_count = fft_size / 2;

    let to_bin = |hz: f32| -> usize {
        if !(nyquist > 0.0) || !hz.is_finite() || hz <= 0.0 {
            return 0;
        }
        let bin = (hz / nyquist * bin_count as f32).floor() as usize;
        bin.min(frequency_data.len())
    };

    let bass = average_range(frequency_data, to_bin(ranges.bass.0), to_bin(ranges.bass.1));
    let mids = average_range(frequency_data, to_bin(ranges.mids.0), to_bin(ranges.mids.1));
    let highs = average_range(
        frequency_data,
        to_bin(ranges.highs_start),
        frequency_data.len().min(bin_count),
    );
    let overall = average_range(frequency_data, 0, frequency_data.len());

    FrequencyBands {
        bass,
        mids,
        highs,
        overall,
    }
}

fn average_range(data: &[u8], start: usize, end: usize) -> f32 {
    let end = end.min(data.len());
    if start >= end {
        return 0.0;
    }

    let sum: u64 = data[start..end].iter().map(|&b| b as u64).sum();
    sum as f32 / ((end - start) as f32 * 255.0)
}

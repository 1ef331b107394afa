use arc_swap::ArcSwap;
use std::sync::Arc;

use super::FrequencyBands;

/// One immutable bundle of analysis and transport state.
///
/// Replaced wholesale on every publish; readers hold an `Arc` to whichever
/// snapshot was current when they loaded it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSnapshot {
    /// Byte magnitudes, lowest bin first, `fft_size / 2` long
    pub frequency_data: Vec<u8>,
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
    pub overall: f32,
    /// True only in the snapshot of the pulse that detected the onset
    pub beat_detected: bool,
    /// Beats detected so far this session; readers that skip frames compare
    /// it with the last count they saw
    pub beat_count: u64,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub audio_file: Option<String>,
    /// Strictly increasing publish counter
    pub sequence: u64,
}

impl AudioSnapshot {
    /// An idle snapshot with `bin_count` zeroed bins.
    pub fn silent(bin_count: usize) -> Self {
        Self {
            frequency_data: vec![0; bin_count],
            bass: 0.0,
            mids: 0.0,
            highs: 0.0,
            overall: 0.0,
            beat_detected: false,
            beat_count: 0,
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            audio_file: None,
            sequence: 0,
        }
    }

    pub fn bands(&self) -> FrequencyBands {
        FrequencyBands {
            bass: self.bass,
            mids: self.mids,
            highs: self.highs,
            overall: self.overall,
        }
    }
}

/// Single-writer, many-reader slot for the current snapshot.
///
/// Clones share the slot, so effects can keep a reader while the session
/// keeps publishing.
#[derive(Clone)]
pub struct SnapshotStore {
    current: Arc<ArcSwap<AudioSnapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: AudioSnapshot) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// The snapshot current at the time of the call.
    pub fn load(&self) -> Arc<AudioSnapshot> {
        self.current.load_full()
    }

    /// Swap in `snapshot`. Rejected (returns false) unless its sequence is
    /// newer than the one already published.
    pub fn publish(&self, snapshot: AudioSnapshot) -> bool {
        let current = self.current.load();
        if snapshot.sequence <= current.sequence {
            log::warn!(
                "Dropping stale audio snapshot #{} (current #{})",
                snapshot.sequence,
                current.sequence
            );
            return false;
        }
        drop(current);
        self.current.store(Arc::new(snapshot));
        true
    }
}

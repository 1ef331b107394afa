pub mod bands;
pub mod beat_detector;
pub mod fft;
pub mod loader;
pub mod playback;
pub mod session;
pub mod snapshot;

pub use bands::{extract_bands, BandRanges, FrequencyBands};
pub use beat_detector::{BeatConfig, BeatDetector};
pub use fft::{AnalyzerConfig, SpectrumAnalyzer};
pub use loader::{AudioSource, DecodedTrack, RodioLoader, SourceLoader};
pub use playback::{AudioOutput, NullOutput, PlaybackClock, RodioOutput};
pub use session::AudioSession;
pub use snapshot::{AudioSnapshot, SnapshotStore};

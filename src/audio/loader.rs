use async_trait::async_trait;
use log::{debug, info};
use rodio::{Decoder, Source};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SessionError};

/// Samples decoded between checks of the cancel flag
const CANCEL_CHECK_SAMPLES: usize = 1 << 16;

/// Something the host decoder can open: raw bytes or a local file.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Bytes { name: String, data: Vec<u8> },
    Path(PathBuf),
}

impl AudioSource {
    /// Accept a plain path or a `file://` URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(AudioSource::Path(PathBuf::from(path)));
        }
        if uri.contains("://") {
            return Err(SessionError::UnsupportedSource(uri.to_string()));
        }
        Ok(AudioSource::Path(PathBuf::from(uri)))
    }

    pub fn name(&self) -> String {
        match self {
            AudioSource::Bytes { name, .. } => name.clone(),
            AudioSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    }
}

/// PCM and metadata for one loaded source.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples as handed to the output sink
    pub samples: Arc<Vec<f32>>,
    /// Channel-averaged samples for analysis
    pub mono: Arc<Vec<f32>>,
    pub duration: f64,
}

impl DecodedTrack {
    /// Build a track from interleaved PCM, mixing to mono for analysis.
    pub fn from_interleaved(
        name: impl Into<String>,
        sample_rate: u32,
        channels: u16,
        samples: Vec<f32>,
    ) -> Result<Self> {
        let name = name.into();
        if sample_rate == 0 || channels == 0 || samples.len() < channels as usize {
            return Err(SessionError::EmptySource(name));
        }

        let mono: Vec<f32> = samples
            .chunks_exact(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        let duration = mono.len() as f64 / sample_rate as f64;

        Ok(Self {
            name,
            sample_rate,
            channels,
            samples: Arc::new(samples),
            mono: Arc::new(mono),
            duration,
        })
    }

    /// Decode on the calling thread.
    pub fn decode(source: AudioSource) -> Result<Self> {
        Self::decode_cancellable(source, &AtomicBool::new(false))
    }

    /// Decode on the calling thread, giving up once `cancel` is set.
    pub fn decode_cancellable(source: AudioSource, cancel: &AtomicBool) -> Result<Self> {
        let name = source.name();
        match source {
            AudioSource::Bytes { data, .. } => {
                Self::decode_with(name, Decoder::new(Cursor::new(data))?, cancel)
            }
            AudioSource::Path(path) => {
                let file = BufReader::new(File::open(&path)?);
                Self::decode_with(name, Decoder::new(file)?, cancel)
            }
        }
    }

    fn decode_with<R>(name: String, decoder: Decoder<R>, cancel: &AtomicBool) -> Result<Self>
    where
        R: std::io::Read + std::io::Seek + Send + Sync + 'static,
    {
        let sample_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let mut samples: Vec<f32> = Vec::new();
        for (i, sample) in decoder.convert_samples::<f32>().enumerate() {
            if i % CANCEL_CHECK_SAMPLES == 0 && cancel.load(Ordering::Relaxed) {
                debug!("Decode of '{}' cancelled after {} samples", name, i);
                return Err(SessionError::LoadTask(format!("decode of '{}' cancelled", name)));
            }
            samples.push(sample);
        }
        debug!(
            "Decoded '{}': {} samples, {} channels @ {}Hz",
            name,
            samples.len(),
            channels,
            sample_rate
        );
        Self::from_interleaved(name, sample_rate, channels, samples)
    }

    /// Mono frames up to (not including) `time` seconds, at most `len` long.
    pub fn mono_window(&self, time: f64, len: usize) -> &[f32] {
        let end = ((time.max(0.0) * self.sample_rate as f64) as usize).min(self.mono.len());
        &self.mono[end.saturating_sub(len)..end]
    }

    /// Interleaved samples from `time` seconds onwards.
    pub fn samples_from(&self, time: f64) -> &[f32] {
        let frame = (time.max(0.0) * self.sample_rate as f64) as usize;
        let start = (frame * self.channels as usize).min(self.samples.len());
        &self.samples[start..]
    }
}

/// Turns an `AudioSource` into a decoded track without blocking the frame loop.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, source: AudioSource) -> Result<DecodedTrack>;
}

/// Sets the flag when the load future goes away, so a decode that lost its
/// caller to the deadline or a dropped future stops early.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Decodes with rodio on tokio's blocking pool, bounded by a deadline.
///
/// A blocking task cannot be aborted, so the decode polls a cancel flag and
/// stops at its next check once the deadline passes.
pub struct RodioLoader {
    timeout: Duration,
}

impl RodioLoader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RodioLoader {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl SourceLoader for RodioLoader {
    async fn load(&self, source: AudioSource) -> Result<DecodedTrack> {
        let name = source.name();
        info!("Loading audio source '{}'", name);

        let cancel = CancelOnDrop(Arc::new(AtomicBool::new(false)));
        let flag = cancel.0.clone();
        let task = tokio::task::spawn_blocking(move || DecodedTrack::decode_cancellable(source, &flag));
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(SessionError::MetadataTimeout(self.timeout.as_secs_f64())),
            Ok(Err(join_err)) => Err(SessionError::LoadTask(join_err.to_string())),
            Ok(Ok(track)) => {
                let track = track?;
                info!(
                    "Loaded '{}' ({}Hz, {} ch, {:.2}s)",
                    track.name, track.sample_rate, track.channels, track.duration
                );
                Ok(track)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_uri() {
        assert!(matches!(
            AudioSource::from_uri("file:///tmp/song.wav"),
            Ok(AudioSource::Path(p)) if p == PathBuf::from("/tmp/song.wav")
        ));
        assert!(matches!(
            AudioSource::from_uri("music/song.mp3"),
            Ok(AudioSource::Path(_))
        ));
        assert!(matches!(
            AudioSource::from_uri("https://example.com/song.mp3"),
            Err(SessionError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn test_source_name() {
        let source = AudioSource::Path(PathBuf::from("/music/track01.flac"));
        assert_eq!(source.name(), "track01.flac");
    }

    #[test]
    fn test_stereo_is_mixed_to_mono() {
        let track =
            DecodedTrack::from_interleaved("t", 4, 2, vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0, 0.25, 0.75])
                .unwrap();
        assert_eq!(*track.mono, vec![0.5, 0.5, 0.0, 0.5]);
        assert_eq!(track.duration, 1.0);
    }

    #[test]
    fn test_empty_pcm_is_rejected() {
        assert!(matches!(
            DecodedTrack::from_interleaved("empty", 44100, 2, vec![]),
            Err(SessionError::EmptySource(_))
        ));
    }

    #[test]
    fn test_windows_clamp_to_track() {
        let track = DecodedTrack::from_interleaved("t", 10, 1, (0..20).map(|i| i as f32).collect()).unwrap();
        assert_eq!(track.mono_window(0.5, 3), &[2.0, 3.0, 4.0]);
        assert_eq!(track.mono_window(0.1, 3), &[0.0]);
        assert_eq!(track.mono_window(99.0, 2), &[18.0, 19.0]);
        assert_eq!(track.samples_from(1.5).len(), 5);
        assert!(track.samples_from(5.0).is_empty());
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let source = AudioSource::Bytes {
            name: "noise.bin".into(),
            data: vec![0x13; 64],
        };
        assert!(DecodedTrack::decode(source).is_err());
    }

    fn wav_source(seconds: f32) -> AudioSource {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(8000.0 * seconds) as usize {
                writer.write_sample(((i % 100) as i16 - 50) * 200).unwrap();
            }
            writer.finalize().unwrap();
        }
        AudioSource::Bytes {
            name: "ramp.wav".into(),
            data: cursor.into_inner(),
        }
    }

    #[test]
    fn test_dropped_guard_sets_the_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(CancelOnDrop(flag.clone()));
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn test_cancelled_decode_stops() {
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            DecodedTrack::decode_cancellable(wav_source(1.0), &cancel),
            Err(SessionError::LoadTask(_))
        ));
    }

    #[test]
    fn test_uncancelled_decode_completes() {
        let cancel = AtomicBool::new(false);
        let track = DecodedTrack::decode_cancellable(wav_source(1.0), &cancel).unwrap();
        assert_eq!(track.sample_rate, 8000);
        assert!((track.duration - 1.0).abs() < 1e-3);
    }
}

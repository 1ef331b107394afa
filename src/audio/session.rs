use log::{debug, info, warn};
use std::sync::Arc;

use super::{
    extract_bands, AudioOutput, AudioSnapshot, AudioSource, BandRanges, BeatDetector,
    DecodedTrack, SnapshotStore, SourceLoader, SpectrumAnalyzer,
};
use crate::config::VisualizerConfig;
use crate::error::{Result, SessionError};

/// Owns playback and analysis for one source at a time and publishes an
/// `AudioSnapshot` on every pulse while playing.
///
/// The analyser and output are created once with the session and reused by
/// every load. Failed loads leave the previous track and snapshot in place.
pub struct AudioSession<O: AudioOutput> {
    output: O,
    analyzer: Option<SpectrumAnalyzer>,
    beat_detector: BeatDetector,
    bands: BandRanges,
    track: Option<DecodedTrack>,
    store: SnapshotStore,
    bin_count: usize,
    sequence: u64,
    beat_count: u64,
    playing: bool,
    volume: f32,
    pulses: u64,
    closed: bool,
}

impl<O: AudioOutput> AudioSession<O> {
    pub fn new(mut output: O, config: &VisualizerConfig) -> Self {
        let analyzer = SpectrumAnalyzer::new(config.analyzer.clone());
        let bin_count = analyzer.bin_count();
        let volume = clamp_volume(config.audio.volume);
        output.set_volume(volume);

        Self {
            output,
            analyzer: Some(analyzer),
            beat_detector: BeatDetector::new(config.beat.clone()),
            bands: config.bands,
            track: None,
            store: SnapshotStore::new(AudioSnapshot::silent(bin_count)),
            bin_count,
            sequence: 0,
            beat_count: 0,
            playing: false,
            volume,
            pulses: 0,
            closed: false,
        }
    }

    /// A reader handle onto the published snapshots.
    pub fn snapshots(&self) -> SnapshotStore {
        self.store.clone()
    }

    pub fn snapshot(&self) -> Arc<AudioSnapshot> {
        self.store.load()
    }

    /// Decode `source` with `loader` and make it the current track.
    ///
    /// Hosts that must keep rendering during the decode can instead await
    /// `loader.load` themselves and hand the result to `attach`.
    pub async fn load_audio<L>(&mut self, loader: &L, source: AudioSource) -> Result<()>
    where
        L: SourceLoader + ?Sized,
    {
        self.ensure_open()?;
        let track = loader.load(source).await?;
        self.attach(track)
    }

    /// Replace the current track with an already decoded one.
    pub fn attach(&mut self, track: DecodedTrack) -> Result<()> {
        self.ensure_open()?;

        if let Some(previous) = &self.track {
            info!("Replacing '{}' with '{}'", previous.name, track.name);
        }

        self.output.load(&track);
        self.output.set_volume(self.volume);
        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.reset();
        }
        self.beat_detector.reset();
        self.playing = false;

        let mut snapshot = AudioSnapshot::silent(self.bin_count);
        snapshot.duration = track.duration;
        snapshot.audio_file = Some(track.name.clone());
        snapshot.beat_count = self.beat_count;
        self.track = Some(track);
        self.publish(snapshot);
        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        self.ensure_open()?;
        let duration = self.track.as_ref().ok_or(SessionError::NoSource)?.duration;
        if self.playing {
            return Ok(());
        }

        self.output.resume()?;
        if self.output.position() >= duration {
            self.output.seek(0.0)?;
        }
        self.output.play()?;
        self.playing = true;
        self.publish_transport();
        Ok(())
    }

    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.output.pause();
        self.playing = false;
        self.publish_transport();
    }

    pub fn toggle_play_pause(&mut self) -> Result<()> {
        if self.playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Move the playhead; the target is clamped to `[0, duration]`.
    pub fn seek(&mut self, time: f64) -> Result<()> {
        self.ensure_open()?;
        if !time.is_finite() {
            return Err(SessionError::InvalidSeek(time));
        }
        let duration = self.track.as_ref().ok_or(SessionError::NoSource)?.duration;

        self.output.seek(time.clamp(0.0, duration))?;
        self.publish_transport();
        Ok(())
    }

    /// Clamp to [0, 1] (NaN becomes 0) and apply.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
        self.output.set_volume(self.volume);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn current_time(&self) -> f64 {
        match &self.track {
            Some(track) => self.output.position().min(track.duration),
            None => 0.0,
        }
    }

    pub fn duration(&self) -> f64 {
        self.track.as_ref().map_or(0.0, |t| t.duration)
    }

    pub fn track(&self) -> Option<&DecodedTrack> {
        self.track.as_ref()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// One analysis step: pull the spectrum at the playhead, reduce it to
    /// bands, run beat detection and publish. Does nothing while paused.
    pub fn pulse(&mut self, now_ms: f64) -> Option<Arc<AudioSnapshot>> {
        if self.closed || !self.playing {
            return None;
        }
        let track = self.track.as_ref()?;
        let analyzer = self.analyzer.as_mut()?;

        let position = self.output.position().min(track.duration);
        let finished = position >= track.duration;

        let window = track.mono_window(position, analyzer.fft_size());
        let frequency_data = analyzer.frequency_data(window);
        let bands = extract_bands(
            &frequency_data,
            track.sample_rate as f32,
            analyzer.fft_size(),
            &self.bands,
        );
        let beat_detected = self.beat_detector.detect_beat(bands.bass, now_ms);
        if beat_detected {
            self.beat_count += 1;
        }
        let duration = track.duration;
        let audio_file = Some(track.name.clone());

        if finished {
            info!("Reached end of '{}'", track.name);
            self.output.pause();
            self.playing = false;
        }

        self.pulses += 1;
        if self.pulses % 120 == 0 {
            debug!(
                "Pulse #{}: t={:.2}s bass={:.3} mids={:.3} highs={:.3} overall={:.3}",
                self.pulses, position, bands.bass, bands.mids, bands.highs, bands.overall
            );
        }

        Some(self.publish(AudioSnapshot {
            frequency_data,
            bass: bands.bass,
            mids: bands.mids,
            highs: bands.highs,
            overall: bands.overall,
            beat_detected,
            beat_count: self.beat_count,
            is_playing: self.playing,
            current_time: position,
            duration,
            audio_file,
            sequence: 0,
        }))
    }

    /// Stop the pulse loop and release the output, track and analyser.
    /// Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.playing = false;
        self.output.close();
        self.track = None;
        self.analyzer = None;
        self.closed = true;
        info!("Audio session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Republish the last analysis with fresh transport fields.
    fn publish_transport(&mut self) {
        let mut snapshot = (*self.store.load()).clone();
        snapshot.beat_detected = false;
        snapshot.is_playing = self.playing;
        snapshot.current_time = self.current_time();
        snapshot.duration = self.duration();
        snapshot.audio_file = self.track.as_ref().map(|t| t.name.clone());
        self.publish(snapshot);
    }

    fn publish(&mut self, mut snapshot: AudioSnapshot) -> Arc<AudioSnapshot> {
        self.sequence += 1;
        snapshot.sequence = self.sequence;
        if !self.store.publish(snapshot) {
            warn!("Snapshot #{} was not published", self.sequence);
        }
        self.store.load()
    }
}

impl<O: AudioOutput> Drop for AudioSession<O> {
    fn drop(&mut self) {
        self.close();
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

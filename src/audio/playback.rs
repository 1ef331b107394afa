use log::{info, warn};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::time::Instant;

use super::DecodedTrack;
use crate::error::Result;

/// Wall-clock playback position: a stored offset plus time since `start`.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    offset: f64,
    started: Option<Instant>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> f64 {
        match self.started {
            Some(started) => self.offset + started.elapsed().as_secs_f64(),
            None => self.offset,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        self.offset = self.position();
        self.started = None;
    }

    pub fn seek(&mut self, position: f64) {
        self.offset = position;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.started = None;
    }
}

/// The device side of a session: where decoded PCM goes and how far it got.
pub trait AudioOutput {
    /// Wake the output if it is suspended. Must succeed before `play`.
    fn resume(&mut self) -> Result<()>;

    /// Replace whatever was queued with `track`, paused at the start.
    fn load(&mut self, track: &DecodedTrack);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn seek(&mut self, position: f64) -> Result<()>;

    fn set_volume(&mut self, volume: f32);

    /// Seconds into the loaded track.
    fn position(&self) -> f64;

    /// Release the loaded track. Safe to call repeatedly.
    fn stop(&mut self);

    /// Release the track and the device behind it. Safe to call repeatedly;
    /// a later `resume` opens the device again.
    fn close(&mut self) {
        self.stop();
    }
}

/// Plays through the default device with rodio.
///
/// The device is opened lazily by `resume`, so constructing the output never
/// touches hardware.
pub struct RodioOutput {
    stream: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
    track: Option<DecodedTrack>,
    clock: PlaybackClock,
    volume: f32,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self {
            stream: None,
            sink: None,
            track: None,
            clock: PlaybackClock::new(),
            volume: 1.0,
        }
    }

    fn build_sink(&self, position: f64) -> Result<Option<Sink>> {
        let (Some((_, handle)), Some(track)) = (&self.stream, &self.track) else {
            return Ok(None);
        };

        let sink = Sink::try_new(handle)?;
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(SamplesBuffer::new(
            track.channels,
            track.sample_rate,
            track.samples_from(position).to_vec(),
        ));
        Ok(Some(sink))
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn resume(&mut self) -> Result<()> {
        if self.stream.is_none() {
            let (stream, handle) = OutputStream::try_default()?;
            info!("Audio output opened");
            self.stream = Some((stream, handle));
        }
        Ok(())
    }

    fn load(&mut self, track: &DecodedTrack) {
        self.stop();
        self.track = Some(track.clone());
    }

    fn play(&mut self) -> Result<()> {
        if self.sink.is_none() {
            self.sink = self.build_sink(self.clock.position())?;
        }
        match &self.sink {
            Some(sink) => {
                sink.play();
                self.clock.start();
                info!("Audio playback started");
            }
            None => warn!("play() without an open output or loaded track"),
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
            info!("Audio playback paused");
        }
        self.clock.pause();
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        let was_playing = self.clock.is_running();
        self.clock.seek(position);

        if let Some(old) = self.sink.take() {
            old.stop();
            self.sink = self.build_sink(position)?;
            if was_playing {
                if let Some(sink) = &self.sink {
                    sink.play();
                }
            }
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn position(&self) -> f64 {
        self.clock.position()
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            info!("Audio playback stopped");
        }
        self.track = None;
        self.clock.reset();
    }

    fn close(&mut self) {
        self.stop();
        if self.stream.take().is_some() {
            info!("Audio output released");
        }
    }
}

/// Clock-only output for headless runs and offline scans.
#[derive(Debug, Default)]
pub struct NullOutput {
    clock: PlaybackClock,
    volume: f32,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}

impl AudioOutput for NullOutput {
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn load(&mut self, _track: &DecodedTrack) {
        self.clock.reset();
    }

    fn play(&mut self) -> Result<()> {
        self.clock.start();
        Ok(())
    }

    fn pause(&mut self) {
        self.clock.pause();
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        self.clock.seek(position);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn position(&self) -> f64 {
        self.clock.position()
    }

    fn stop(&mut self) {
        self.clock.reset();
    }
}

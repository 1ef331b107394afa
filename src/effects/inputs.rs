use crate::audio::AudioSnapshot;

/// Audio-derived state an effect reads each update.
///
/// Levels ease toward the snapshot so effects running below the frame rate
/// do not jump; the beat pulse jumps to 1 on a beat and decays. Beats are
/// counted from the snapshot's running total, so an effect gated below the
/// frame rate still sees beats that landed on frames it skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInputs {
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
    pub overall: f32,
    pub beat: bool,
    /// Beats since the previous update
    pub new_beats: u64,
    pub beat_pulse: f32,
    pub is_playing: bool,
    pub sequence: u64,
    /// Seconds since the previous update
    pub delta_seconds: f32,
    /// Per-second easing speed for the band levels
    pub response: f32,
    /// Per-second decay of `beat_pulse`
    pub pulse_decay: f32,
    last_update_ms: Option<f64>,
    beat_count_seen: Option<u64>,
}

impl EffectInputs {
    pub fn new(response: f32, pulse_decay: f32) -> Self {
        Self {
            bass: 0.0,
            mids: 0.0,
            highs: 0.0,
            overall: 0.0,
            beat: false,
            new_beats: 0,
            beat_pulse: 0.0,
            is_playing: false,
            sequence: 0,
            delta_seconds: 0.0,
            response,
            pulse_decay,
            last_update_ms: None,
            beat_count_seen: None,
        }
    }

    /// Fold the snapshot published for this frame into the inputs.
    pub fn update_inputs(&mut self, snapshot: &AudioSnapshot, now_ms: f64) {
        let (dt, blend) = match self.last_update_ms {
            Some(last) if now_ms > last => {
                let dt = ((now_ms - last) / 1000.0) as f32;
                (dt, 1.0 - (-self.response * dt).exp())
            }
            Some(_) => (0.0, 0.0),
            None => (0.0, 1.0),
        };
        self.last_update_ms = Some(now_ms);
        self.delta_seconds = dt;

        self.bass += (snapshot.bass - self.bass) * blend;
        self.mids += (snapshot.mids - self.mids) * blend;
        self.highs += (snapshot.highs - self.highs) * blend;
        self.overall += (snapshot.overall - self.overall) * blend;

        // A snapshot seen twice leaves the count unchanged, so no second beat
        self.new_beats = match self.beat_count_seen {
            Some(seen) => snapshot.beat_count.saturating_sub(seen),
            None => u64::from(snapshot.beat_detected),
        };
        self.beat_count_seen = Some(snapshot.beat_count);
        self.beat = self.new_beats > 0;
        self.beat_pulse = if self.beat {
            1.0
        } else {
            self.beat_pulse * (-self.pulse_decay * dt).exp()
        };

        self.is_playing = snapshot.is_playing;
        self.sequence = snapshot.sequence;
    }
}

impl Default for EffectInputs {
    fn default() -> Self {
        Self::new(12.0, 6.0)
    }
}

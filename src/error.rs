//! Error types for the audio session, the animation scheduler and configuration.
//!
//! Audio pipeline failures are surfaced to the caller; scheduler callback
//! failures never leave the scheduler (they are logged per entry instead).

use std::path::PathBuf;

/// Result alias for audio session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures of the audio session controller (load and transport).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The source could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host decoder rejected the stream
    #[error("Failed to decode audio: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),

    /// The stream decoded to zero frames or carried an invalid format
    #[error("Audio source '{0}' contains no playable frames")]
    EmptySource(String),

    /// Only plain paths and file:// URIs are understood
    #[error("Unsupported audio source: {0}")]
    UnsupportedSource(String),

    /// Decoding did not produce metadata before the deadline
    #[error("Timed out after {0:.1}s waiting for audio metadata")]
    MetadataTimeout(f64),

    /// The blocking decode task died
    #[error("Audio load task failed: {0}")]
    LoadTask(String),

    /// The output device could not be opened or resumed
    #[error("Audio output error: {0}")]
    Output(String),

    /// A transport call needs a loaded source
    #[error("No audio source loaded")]
    NoSource,

    /// Seek target was NaN or infinite
    #[error("Invalid seek position: {0}")]
    InvalidSeek(f64),

    /// The session was torn down
    #[error("Audio session is closed")]
    Closed,
}

impl From<rodio::StreamError> for SessionError {
    fn from(err: rodio::StreamError) -> Self {
        SessionError::Output(err.to_string())
    }
}

impl From<rodio::PlayError> for SessionError {
    fn from(err: rodio::PlayError) -> Self {
        SessionError::Output(err.to_string())
    }
}

/// Failures when registering work with the animation scheduler.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchedulerError {
    #[error("Update rate for '{id}' must be a positive finite number of Hz, got {rate}")]
    InvalidRate { id: String, rate: f32 },

    #[error("Registration id must not be empty")]
    EmptyId,
}

/// Failures loading or validating the visualizer configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

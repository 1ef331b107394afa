//! Audio-reactive visualizer core: spectrum analysis and beat detection on a
//! playing track, a rate-limited animation scheduler, and adaptive quality.

pub mod animation;
pub mod audio;
pub mod config;
pub mod driver;
pub mod effects;
pub mod error;
pub mod performance;

pub use config::VisualizerConfig;
pub use driver::{FrameDriver, FrameReport};

pub mod controller;
pub mod monitor;
pub mod preset;

pub use controller::{QualityController, QualityMode};
pub use monitor::PerformanceMonitor;
pub use preset::{ComponentQuality, DetailLevel, PerformancePreset};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::animation::RateTable;

/// Quality tiers, cheapest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PerformancePreset {
    Potato,
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl PerformancePreset {
    pub const ALL: [PerformancePreset; 5] = [
        PerformancePreset::Ultra,
        PerformancePreset::High,
        PerformancePreset::Medium,
        PerformancePreset::Low,
        PerformancePreset::Potato,
    ];

    /// Preset for a measured frame rate. `Ultra` is never chosen
    /// automatically.
    pub fn for_fps(fps: f32) -> Self {
        if fps >= 55.0 {
            PerformancePreset::High
        } else if fps >= 45.0 {
            PerformancePreset::Medium
        } else if fps >= 35.0 {
            PerformancePreset::Low
        } else {
            PerformancePreset::Potato
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PerformancePreset::Ultra => "ultra",
            PerformancePreset::High => "high",
            PerformancePreset::Medium => "medium",
            PerformancePreset::Low => "low",
            PerformancePreset::Potato => "potato",
        }
    }

    /// Animation update rates for this tier.
    pub fn rates(&self) -> RateTable {
        match self {
            PerformancePreset::Ultra => RateTable::new(60.0, 60.0, 30.0),
            PerformancePreset::High => RateTable::new(60.0, 30.0, 15.0),
            PerformancePreset::Medium => RateTable::new(60.0, 20.0, 10.0),
            PerformancePreset::Low => RateTable::new(30.0, 15.0, 10.0),
            PerformancePreset::Potato => RateTable::new(30.0, 10.0, 5.0),
        }
    }

    pub fn quality(&self) -> ComponentQuality {
        use DetailLevel::*;
        let (street_detail, sky_detail, particles, reflections, max_crowd, max_vehicles, max_particles) =
            match self {
                PerformancePreset::Ultra => (High, High, true, true, 200, 40, 5000),
                PerformancePreset::High => (High, High, true, true, 120, 24, 3000),
                PerformancePreset::Medium => (Medium, Medium, true, false, 60, 12, 1500),
                PerformancePreset::Low => (Low, Medium, true, false, 30, 6, 500),
                PerformancePreset::Potato => (Low, Low, false, false, 10, 2, 0),
            };

        ComponentQuality {
            street_detail,
            sky_detail,
            particles,
            reflections,
            max_crowd,
            max_vehicles,
            max_particles,
        }
    }
}

impl fmt::Display for PerformancePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PerformancePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown preset '{}', expected ultra, high, medium, low or potato", s)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Low,
    Medium,
    High,
}

/// Budgets effects size themselves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentQuality {
    pub street_detail: DetailLevel,
    pub sky_detail: DetailLevel,
    pub particles: bool,
    pub reflections: bool,
    pub max_crowd: usize,
    pub max_vehicles: usize,
    pub max_particles: usize,
}

impl Default for ComponentQuality {
    fn default() -> Self {
        PerformancePreset::default().quality()
    }
}

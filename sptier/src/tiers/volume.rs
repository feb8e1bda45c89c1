//! Expected data volume classes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AdvisorError;

/// Expected event volume. Scales the displayed cost estimate only; it never
/// changes which tier is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeClass {
    /// Light traffic.
    #[default]
    Low,
    /// Moderate traffic.
    Medium,
    /// Heavy traffic.
    High,
    /// Sustained very heavy traffic.
    VeryHigh,
}

impl VolumeClass {
    /// Cost display multiplier.
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 4.0,
            Self::VeryHigh => 8.0,
        }
    }
}

impl fmt::Display for VolumeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::VeryHigh => write!(f, "very-high"),
        }
    }
}

impl FromStr for VolumeClass {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "very-high" | "veryhigh" => Ok(Self::VeryHigh),
            other => Err(AdvisorError::config(format!("unknown volume class '{other}'"))),
        }
    }
}

/// Relative cost shown next to a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    /// Volume class used.
    pub volume: VolumeClass,
    /// The tier's relative cost weight.
    pub cost_weight: f64,
    /// The volume multiplier.
    pub multiplier: f64,
    /// `cost_weight * multiplier`.
    pub relative_cost: f64,
}

impl CostEstimate {
    /// Computes the estimate for a tier cost weight.
    #[must_use]
    pub fn new(cost_weight: f64, volume: VolumeClass) -> Self {
        let multiplier = volume.multiplier();
        Self {
            volume,
            cost_weight,
            multiplier,
            relative_cost: cost_weight * multiplier,
        }
    }
}

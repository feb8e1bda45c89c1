//! Tier selection.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::table::{Tier, TierTable};
use super::volume::{CostEstimate, VolumeClass};
use crate::errors::{AdvisorError, TierUnavailableError};

/// Which constraint decided the selected tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionDriver {
    /// The smallest tier satisfied both constraints.
    Minimum,
    /// The parallelism ceiling pushed past smaller tiers.
    Parallelism,
    /// The complexity band pushed past the parallelism-fit tier.
    Complexity,
}

impl fmt::Display for SelectionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimum => write!(f, "minimum"),
            Self::Parallelism => write!(f, "parallelism"),
            Self::Complexity => write!(f, "complexity"),
        }
    }
}

/// The advisor's answer for one pipeline. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierRecommendation {
    /// Selected tier name.
    pub tier: String,
    /// Complexity score the selection used.
    pub complexity_score: u64,
    /// Parallelism total the selection used.
    pub parallelism_total: u64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable rationale naming the driving constraint.
    pub reasoning: String,
    /// The driving constraint.
    pub driver: SelectionDriver,
    /// Cost display, present when a volume class was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<CostEstimate>,
}

/// Picks the cheapest tier that satisfies both the parallelism ceiling and the
/// complexity band.
#[derive(Debug, Clone)]
pub struct TierSelector {
    table: Arc<TierTable>,
}

impl TierSelector {
    /// Creates a selector over a shared table.
    #[must_use]
    pub fn new(table: Arc<TierTable>) -> Self {
        Self { table }
    }

    /// Returns the table.
    #[must_use]
    pub fn table(&self) -> &Arc<TierTable> {
        &self.table
    }

    /// Selects a tier with full confidence.
    ///
    /// # Errors
    ///
    /// `TierUnavailable` when the parallelism total exceeds the largest
    /// ceiling, or no tier at or above the parallelism fit admits the score.
    pub fn select(
        &self,
        complexity_score: u64,
        parallelism_total: u64,
        volume: Option<VolumeClass>,
    ) -> Result<TierRecommendation, AdvisorError> {
        self.select_with_confidence(complexity_score, parallelism_total, volume, 1.0)
    }

    /// Selects a tier, attaching the caller's confidence.
    pub fn select_with_confidence(
        &self,
        complexity_score: u64,
        parallelism_total: u64,
        volume: Option<VolumeClass>,
        confidence: f64,
    ) -> Result<TierRecommendation, AdvisorError> {
        let tiers = self.table.tiers();
        let unavailable = || TierUnavailableError {
            parallelism_total,
            complexity_score,
            largest_tier: self.table.largest().name.clone(),
            largest_max_parallelism: self.table.largest().max_parallelism,
        };

        let fit = tiers
            .iter()
            .position(|t| t.fits_parallelism(parallelism_total))
            .ok_or_else(unavailable)?;
        let chosen = (fit..tiers.len())
            .find(|&i| tiers[i].admits_complexity(complexity_score))
            .ok_or_else(unavailable)?;

        let driver = if chosen > fit {
            SelectionDriver::Complexity
        } else if fit > 0 {
            SelectionDriver::Parallelism
        } else {
            SelectionDriver::Minimum
        };

        let tier = &tiers[chosen];
        let reasoning = rationale(driver, tier, &tiers[fit], complexity_score, parallelism_total);

        tracing::debug!(
            tier = %tier.name,
            %driver,
            complexity_score,
            parallelism_total,
            "Tier selected"
        );

        Ok(TierRecommendation {
            tier: tier.name.clone(),
            complexity_score,
            parallelism_total,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            driver,
            estimated_cost: volume.map(|v| CostEstimate::new(tier.cost_weight, v)),
        })
    }
}

fn rationale(driver: SelectionDriver, chosen: &Tier, fit: &Tier, complexity: u64, parallelism: u64) -> String {
    match driver {
        SelectionDriver::Minimum => format!(
            "Minimum tier: {} covers total parallelism {parallelism} (ceiling {}) and complexity score {complexity} (band {})",
            chosen.name,
            chosen.max_parallelism,
            chosen.complexity_band()
        ),
        SelectionDriver::Parallelism => format!(
            "Parallelism-driven: {} is the smallest tier whose ceiling ({}) covers total parallelism {parallelism}; complexity score {complexity} is within its band ({})",
            chosen.name,
            chosen.max_parallelism,
            chosen.complexity_band()
        ),
        SelectionDriver::Complexity => format!(
            "Complexity-driven: total parallelism {parallelism} fits {} (ceiling {}) but complexity score {complexity} exceeds its band ({}); {} allows complexity {}",
            fit.name,
            fit.max_parallelism,
            fit.complexity_band(),
            chosen.name,
            chosen.complexity_band()
        ),
    }
}

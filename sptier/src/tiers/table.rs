//! The ordered tier table.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::errors::AdvisorError;

/// A named resource class offered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier identifier as the provider spells it (e.g. `SP10`).
    pub name: String,
    /// Highest billable parallelism total the tier accepts.
    pub max_parallelism: u64,
    /// Highest complexity score the tier is sized for; `None` is unbounded.
    #[serde(default)]
    pub max_complexity: Option<u64>,
    /// Relative cost, used for display only.
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
}

fn default_cost_weight() -> f64 {
    1.0
}

impl Tier {
    /// Creates a new tier.
    #[must_use]
    pub fn new(name: impl Into<String>, max_parallelism: u64, max_complexity: Option<u64>, cost_weight: f64) -> Self {
        Self {
            name: name.into(),
            max_parallelism,
            max_complexity,
            cost_weight,
        }
    }

    /// Whether the tier's ceiling covers the parallelism total.
    #[must_use]
    pub fn fits_parallelism(&self, total: u64) -> bool {
        self.max_parallelism >= total
    }

    /// Whether the tier's complexity band covers the score.
    #[must_use]
    pub fn admits_complexity(&self, score: u64) -> bool {
        self.max_complexity.map_or(true, |max| score <= max)
    }

    /// The complexity band as text.
    #[must_use]
    pub fn complexity_band(&self) -> String {
        self.max_complexity
            .map_or_else(|| "unbounded".to_string(), |max| format!("<= {max}"))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TierTableFile {
    Wrapped { tiers: Vec<Tier> },
    Bare(Vec<Tier>),
}

static ATLAS_DEFAULT: LazyLock<Arc<TierTable>> =
    LazyLock::new(|| Arc::new(TierTable::atlas_default()));

/// Tiers ordered by ascending capability.
///
/// Validated once on construction and never mutated afterwards; share it
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    /// Builds and validates a table.
    ///
    /// # Errors
    ///
    /// `Config` when the table is empty, names repeat, ceilings decrease, or an
    /// unbounded complexity band is followed by a bounded one.
    pub fn new(tiers: Vec<Tier>) -> Result<Self, AdvisorError> {
        if tiers.is_empty() {
            return Err(AdvisorError::config("tier table is empty"));
        }

        let mut seen = HashSet::new();
        for tier in &tiers {
            if tier.name.trim().is_empty() {
                return Err(AdvisorError::config("tier name cannot be empty"));
            }
            if !seen.insert(tier.name.to_ascii_uppercase()) {
                return Err(AdvisorError::config(format!("duplicate tier '{}'", tier.name)));
            }
            if !tier.cost_weight.is_finite() || tier.cost_weight < 0.0 {
                return Err(AdvisorError::config(format!(
                    "tier '{}' has an invalid cost weight",
                    tier.name
                )));
            }
        }

        for pair in tiers.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.max_parallelism < lower.max_parallelism {
                return Err(AdvisorError::config(format!(
                    "tier '{}' has a lower parallelism ceiling than '{}'",
                    upper.name, lower.name
                )));
            }
            match (lower.max_complexity, upper.max_complexity) {
                (None, Some(_)) => {
                    return Err(AdvisorError::config(format!(
                        "tier '{}' bounds complexity after unbounded '{}'",
                        upper.name, lower.name
                    )))
                }
                (Some(lo), Some(hi)) if hi < lo => {
                    return Err(AdvisorError::config(format!(
                        "tier '{}' has a lower complexity band than '{}'",
                        upper.name, lower.name
                    )))
                }
                _ => {}
            }
        }

        Ok(Self { tiers })
    }

    /// The Atlas Stream Processing tiers.
    #[must_use]
    pub fn atlas_default() -> Self {
        Self {
            tiers: vec![
                Tier::new("SP2", 0, Some(5), 1.0),
                Tier::new("SP5", 1, Some(10), 2.5),
                Tier::new("SP10", 8, Some(20), 5.0),
                Tier::new("SP30", 48, Some(40), 15.0),
                Tier::new("SP50", 96, None, 25.0),
            ],
        }
    }

    /// The process-wide default table.
    #[must_use]
    pub fn shared_default() -> Arc<Self> {
        Arc::clone(&ATLAS_DEFAULT)
    }

    /// Parses a JSON table: either `{"tiers": [...]}` or a bare array.
    pub fn from_json(text: &str) -> Result<Self, AdvisorError> {
        let tiers = match serde_json::from_str::<TierTableFile>(text)? {
            TierTableFile::Wrapped { tiers } | TierTableFile::Bare(tiers) => tiers,
        };
        Self::new(tiers)
    }

    /// Loads a JSON table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AdvisorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AdvisorError::config(format!("cannot read tier table {}: {e}", path.display()))
        })?;
        let table = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), tiers = table.len(), "Loaded tier table");
        Ok(table)
    }

    /// Tiers in ascending order.
    #[must_use]
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Always false; construction rejects empty tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Position of a tier by name, ignoring ASCII case.
    #[must_use]
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Looks up a tier by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.rank(name).map(|i| &self.tiers[i])
    }

    /// Whether the table contains the tier.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rank(name).is_some()
    }

    /// The least capable tier.
    #[must_use]
    pub fn smallest(&self) -> &Tier {
        &self.tiers[0]
    }

    /// The most capable tier.
    #[must_use]
    pub fn largest(&self) -> &Tier {
        &self.tiers[self.tiers.len() - 1]
    }

    /// First tier whose ceiling covers the parallelism total.
    #[must_use]
    pub fn smallest_fitting(&self, total: u64) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.fits_parallelism(total))
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::atlas_default()
    }
}

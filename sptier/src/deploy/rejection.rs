//! Extraction of tier suggestions from provider rejections.
//!
//! Two message shapes are recognized, in this order:
//!
//! 1. `Minimum tier for this workload: SP30 or larger` names the tier directly.
//! 2. `Requested: 12, Limit: 8` reports a parallelism pair; the suggestion is
//!    the smallest tier in the table whose ceiling covers the requested value.
//!
//! Anything else is not a tier rejection. Changes in the provider's wording
//! must show up as failing fixtures in the tests below.

use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

use super::controller::ExhaustReason;
use super::protocols::ProviderRejection;
use crate::tiers::TierTable;

#[allow(clippy::expect_used)]
static MINIMUM_TIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)minimum tier for this workload:\s*([a-z]+[0-9]+)").expect("minimum tier pattern")
});

#[allow(clippy::expect_used)]
static REQUESTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)requested:\s*(\d+)").expect("requested pattern"));

#[allow(clippy::expect_used)]
static LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)limit:\s*(\d+)").expect("limit pattern"));

/// What a rejection message says about the required tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TierHint {
    /// The message names a minimum tier.
    Named {
        /// Tier name, upper-cased.
        tier: String,
    },
    /// The message reports a parallelism pair.
    Parallelism {
        /// Requested parallelism.
        requested: u64,
        /// Limit of the rejected tier, when stated.
        limit: Option<u64>,
    },
}

/// Parses rejection text against a tier table.
#[derive(Debug, Clone)]
pub struct RejectionParser {
    table: Arc<TierTable>,
}

impl RejectionParser {
    /// Creates a parser resolving hints against `table`.
    #[must_use]
    pub fn new(table: Arc<TierTable>) -> Self {
        Self { table }
    }

    /// Extracts a hint from free text.
    #[must_use]
    pub fn extract(text: &str) -> Option<TierHint> {
        if let Some(caps) = MINIMUM_TIER.captures(text) {
            return Some(TierHint::Named {
                tier: caps[1].to_ascii_uppercase(),
            });
        }

        let requested = REQUESTED
            .captures(text)
            .and_then(|caps| caps[1].parse::<u64>().ok())?;
        let limit = LIMIT.captures(text).and_then(|caps| caps[1].parse::<u64>().ok());
        Some(TierHint::Parallelism { requested, limit })
    }

    /// Resolves a rejection to a tier present in the table.
    ///
    /// # Errors
    ///
    /// The exhaustion reason when the message has no recognizable hint, names
    /// a tier outside the table, or requests more parallelism than any tier
    /// allows.
    pub fn suggest(&self, rejection: &ProviderRejection) -> Result<String, ExhaustReason> {
        let hint = Self::extract(&rejection.detail).ok_or(ExhaustReason::UnparseableRejection)?;
        self.resolve(&hint)
    }

    /// Resolves a hint to a tier name as spelled in the table.
    pub fn resolve(&self, hint: &TierHint) -> Result<String, ExhaustReason> {
        match hint {
            TierHint::Named { tier } => self
                .table
                .get(tier)
                .map(|t| t.name.clone())
                .ok_or_else(|| ExhaustReason::UnknownTier { tier: tier.clone() }),
            TierHint::Parallelism { requested, .. } => self
                .table
                .smallest_fitting(*requested)
                .map(|t| t.name.clone())
                .ok_or(ExhaustReason::NoTierForParallelism {
                    requested: *requested,
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parser() -> RejectionParser {
        RejectionParser::new(TierTable::shared_default())
    }

    fn rejection(detail: &str) -> ProviderRejection {
        ProviderRejection::new(400, detail)
    }

    #[test]
    fn fixture_minimum_tier_sentence() {
        let r = rejection("Invalid tier for this stream processor. Minimum tier for this workload: SP10 or larger.");
        assert_eq!(parser().suggest(&r), Ok("SP10".to_string()));
    }

    #[test]
    fn fixture_minimum_tier_lowercase() {
        let r = rejection("minimum tier for this workload: sp30 or larger");
        assert_eq!(parser().suggest(&r), Ok("SP30".to_string()));
    }

    #[test]
    fn fixture_named_tier_wins_over_parallelism_pair() {
        let r = rejection(
            "Parallelism exceeds the limit for tier SP10. Requested: 12, Limit: 8. Minimum tier for this workload: SP50 or larger.",
        );
        assert_eq!(
            RejectionParser::extract(&r.detail),
            Some(TierHint::Named { tier: "SP50".to_string() })
        );
        assert_eq!(parser().suggest(&r), Ok("SP50".to_string()));
    }

    #[test]
    fn fixture_parallelism_pair_only() {
        let r = rejection("Requested parallelism exceeds tier limit. Requested: 12, Limit: 8");
        assert_eq!(
            RejectionParser::extract(&r.detail),
            Some(TierHint::Parallelism { requested: 12, limit: Some(8) })
        );
        assert_eq!(parser().suggest(&r), Ok("SP30".to_string()));
    }

    #[test]
    fn fixture_parallelism_without_limit() {
        let r = rejection("Total parallelism too high (Requested: 3)");
        assert_eq!(
            RejectionParser::extract(&r.detail),
            Some(TierHint::Parallelism { requested: 3, limit: None })
        );
        assert_eq!(parser().suggest(&r), Ok("SP10".to_string()));
    }

    #[test]
    fn fixture_parallelism_beyond_every_tier() {
        let r = rejection("Requested: 500, Limit: 96");
        assert_eq!(
            parser().suggest(&r),
            Err(ExhaustReason::NoTierForParallelism { requested: 500 })
        );
    }

    #[test]
    fn fixture_unknown_tier_name() {
        let r = rejection("Minimum tier for this workload: SP100 or larger.");
        assert_eq!(
            parser().suggest(&r),
            Err(ExhaustReason::UnknownTier { tier: "SP100".to_string() })
        );
    }

    #[test]
    fn fixture_unrelated_message() {
        let r = rejection("Stream processor 'orders' is already started.");
        assert_eq!(parser().suggest(&r), Err(ExhaustReason::UnparseableRejection));
    }

    #[test]
    fn fixture_json_payload() {
        let r = ProviderRejection::from_body(
            400,
            r#"{"error":400,"detail":"Minimum tier for this workload: SP5 or larger.","errorCode":"STREAM_PROCESSOR_INVALID_TIER"}"#,
        );
        assert_eq!(parser().suggest(&r), Ok("SP5".to_string()));
    }

    #[test]
    fn fixture_timeout_has_no_hint() {
        let r = ProviderRejection::timeout(std::time::Duration::from_secs(1));
        assert_eq!(parser().suggest(&r), Err(ExhaustReason::UnparseableRejection));
    }
}

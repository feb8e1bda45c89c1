//! Auto-retry controller for tier-rejected starts.
//!
//! The controller attempts a start at the requested tier. When the provider
//! rejects it and names (or implies) a larger tier, it retries exactly once per
//! strictly larger tier. It never loops on the same tier and never tries a tier
//! that is not in the table.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::protocols::{ProcessorStarter, ProviderRejection, StartOutcome};
use super::rejection::RejectionParser;
use crate::cancellation::CancellationToken;
use crate::errors::{AdvisorError, ExhaustedError};
use crate::tiers::TierTable;

/// Default bound on a single start attempt, confirmation polling included.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// One attempt in the retry history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    /// Tier that was tried.
    pub tier: String,
    /// Why the provider refused it.
    pub rejection_reason: String,
}

impl AttemptRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(tier: impl Into<String>, rejection_reason: impl Into<String>) -> Self {
        Self {
            tier: tier.into(),
            rejection_reason: rejection_reason.into(),
        }
    }
}

/// Why the controller stopped without success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExhaustReason {
    /// The rejection carried no recognizable tier hint.
    UnparseableRejection,
    /// The rejection named a tier that is not in the table.
    UnknownTier {
        /// The named tier.
        tier: String,
    },
    /// The rejection asked for more parallelism than any tier allows.
    NoTierForParallelism {
        /// Requested parallelism.
        requested: u64,
    },
    /// The suggested tier is not larger than one already tried.
    NoProgress {
        /// The suggested tier.
        tier: String,
    },
    /// The attempt did not finish within the bound.
    Timeout,
    /// The provider could not be reached.
    Transport,
    /// Every tier in the table has been tried.
    AttemptLimit,
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnparseableRejection => write!(f, "rejection did not suggest a tier"),
            Self::UnknownTier { tier } => write!(f, "suggested tier {tier} is not in the tier table"),
            Self::NoTierForParallelism { requested } => {
                write!(f, "no tier allows requested parallelism {requested}")
            }
            Self::NoProgress { tier } => {
                write!(f, "suggested tier {tier} is not larger than a tier already attempted")
            }
            Self::Timeout => write!(f, "attempt timed out"),
            Self::Transport => write!(f, "provider unreachable"),
            Self::AttemptLimit => write!(f, "every tier has been attempted"),
        }
    }
}

/// Controller states, recorded in the order they were entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptState {
    /// Nothing attempted yet.
    Idle,
    /// A start is in flight.
    Attempting {
        /// Tier being tried.
        tier: String,
    },
    /// The provider accepted the start.
    Succeeded {
        /// Accepted tier.
        tier: String,
    },
    /// The provider refused the start.
    Rejected {
        /// Refused tier.
        tier: String,
        /// Tier the rejection points to, if any.
        suggested: Option<String>,
    },
    /// The controller gave up.
    Exhausted {
        /// Why.
        reason: ExhaustReason,
    },
}

impl AttemptState {
    /// Whether no further transition can follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Exhausted { .. })
    }
}

/// A successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    /// Processor name.
    pub processor: String,
    /// Tier the caller asked for.
    pub requested_tier: String,
    /// Tier the provider accepted.
    pub tier: String,
    /// Rejected attempts that preceded the success.
    pub history: Vec<AttemptRecord>,
    /// Every state the controller passed through.
    pub states: Vec<AttemptState>,
}

impl Deployment {
    /// Total number of start requests sent.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.history.len() + 1
    }

    /// Whether the accepted tier differs from the requested one.
    #[must_use]
    pub fn escalated(&self) -> bool {
        self.tier != self.requested_tier
    }
}

/// Drives starts through the tier ladder.
pub struct AutoRetryController {
    starter: Arc<dyn ProcessorStarter>,
    table: Arc<TierTable>,
    parser: RejectionParser,
    attempt_timeout: Duration,
}

impl AutoRetryController {
    /// Creates a controller.
    #[must_use]
    pub fn new(starter: Arc<dyn ProcessorStarter>, table: Arc<TierTable>) -> Self {
        Self {
            starter,
            parser: RejectionParser::new(table.clone()),
            table,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Sets the per-attempt bound.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Returns the tier table.
    #[must_use]
    pub fn table(&self) -> &Arc<TierTable> {
        &self.table
    }

    /// Upper bound on attempts for one start.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.table.len()
    }

    /// Starts `processor` at `initial_tier`, escalating on tier rejections.
    ///
    /// Cancellation is observed between attempts; an attempt already in flight
    /// runs to completion or to its timeout.
    ///
    /// # Errors
    ///
    /// - `Config` when `initial_tier` is not in the table
    /// - `Exhausted` with the full history when no further tier can be tried
    /// - `Cancelled` with the history so far
    pub async fn deploy(
        &self,
        processor: &str,
        initial_tier: &str,
        cancel: &CancellationToken,
    ) -> Result<Deployment, AdvisorError> {
        let requested_tier = self
            .table
            .get(initial_tier)
            .map(|t| t.name.clone())
            .ok_or_else(|| AdvisorError::config(format!("tier '{initial_tier}' is not in the tier table")))?;
        let mut tier = requested_tier.clone();

        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut states = vec![AttemptState::Idle];

        loop {
            if cancel.is_cancelled() {
                tracing::warn!(processor, attempts = history.len(), "Start cancelled");
                return Err(cancel.to_error(history));
            }
            if history.len() >= self.max_attempts() {
                return Err(self.exhaust(processor, ExhaustReason::AttemptLimit, history, states));
            }

            states.push(AttemptState::Attempting { tier: tier.clone() });
            tracing::info!(processor, %tier, attempt = history.len() + 1, "Starting processor");

            let result = tokio::time::timeout(
                self.attempt_timeout,
                self.starter.start_with_tier(processor, &tier),
            )
            .await;

            let rejection = match result {
                Ok(Ok(StartOutcome::Accepted)) => {
                    tracing::info!(processor, %tier, attempts = history.len() + 1, "Processor started");
                    states.push(AttemptState::Succeeded { tier: tier.clone() });
                    return Ok(Deployment {
                        processor: processor.to_string(),
                        requested_tier,
                        tier,
                        history,
                        states,
                    });
                }
                Ok(Ok(StartOutcome::Rejected(rejection))) => rejection,
                Ok(Err(AdvisorError::ProviderRejection { status, detail })) => ProviderRejection::new(status, detail),
                Ok(Err(AdvisorError::ProviderTimeout { .. })) | Err(_) => ProviderRejection::timeout(self.attempt_timeout),
                Ok(Err(err)) => {
                    tracing::warn!(processor, %tier, error = %err, "Start request failed");
                    history.push(AttemptRecord::new(&tier, err.to_string()));
                    states.push(AttemptState::Rejected {
                        tier: tier.clone(),
                        suggested: None,
                    });
                    return Err(self.exhaust(processor, ExhaustReason::Transport, history, states));
                }
            };

            history.push(AttemptRecord::new(&tier, rejection.reason()));
            let next = if rejection.is_timeout() {
                Err(ExhaustReason::Timeout)
            } else {
                self.parser.suggest(&rejection)
            };

            tracing::warn!(
                processor,
                %tier,
                suggested = next.as_deref().unwrap_or("-"),
                detail = %rejection.detail,
                "Start rejected"
            );
            states.push(AttemptState::Rejected {
                tier: tier.clone(),
                suggested: next.as_ref().ok().cloned(),
            });

            match next.and_then(|suggested| self.escalation(&suggested, &history)) {
                Ok(next_tier) => tier = next_tier,
                Err(reason) => return Err(self.exhaust(processor, reason, history, states)),
            }
        }
    }

    /// Accepts `suggested` only if it ranks above every tier already tried.
    fn escalation(&self, suggested: &str, history: &[AttemptRecord]) -> Result<String, ExhaustReason> {
        let rank = self.table.rank(suggested).ok_or_else(|| ExhaustReason::UnknownTier {
            tier: suggested.to_string(),
        })?;
        let highest_tried = history.iter().filter_map(|r| self.table.rank(&r.tier)).max();

        if highest_tried.is_some_and(|tried| rank <= tried) {
            return Err(ExhaustReason::NoProgress {
                tier: suggested.to_string(),
            });
        }
        Ok(self.table.tiers()[rank].name.clone())
    }

    fn exhaust(
        &self,
        processor: &str,
        reason: ExhaustReason,
        history: Vec<AttemptRecord>,
        mut states: Vec<AttemptState>,
    ) -> AdvisorError {
        tracing::error!(processor, %reason, attempts = history.len(), "Start exhausted");
        states.push(AttemptState::Exhausted { reason: reason.clone() });
        tracing::debug!(processor, states = ?states, "Controller transitions");
        ExhaustedError {
            processor: processor.to_string(),
            reason,
            history,
        }
        .into()
    }
}

impl fmt::Debug for AutoRetryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRetryController")
            .field("tiers", &self.table.len())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

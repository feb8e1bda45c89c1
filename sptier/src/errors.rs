//! Error types for the tier advisor.
//!
//! Every failure surfaced to a caller maps onto one entry of a small taxonomy
//! (see [`AdvisorError::error_kind`]). Analysis errors are fatal for the single
//! processor they concern; provider errors feed the auto-retry controller.

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

use crate::deploy::{AttemptRecord, ExhaustReason};

/// The main error type for advisor operations.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// The pipeline is structurally invalid.
    #[error("{0}")]
    MalformedPipeline(#[from] MalformedPipelineError),

    /// A stage declares a parallelism outside the domain.
    #[error("{0}")]
    InvalidParallelism(#[from] InvalidParallelismError),

    /// No tier in the table satisfies the computed requirement.
    #[error("{0}")]
    TierUnavailable(#[from] TierUnavailableError),

    /// The provider rejected a request.
    #[error("Provider rejected request (HTTP {status}): {detail}")]
    ProviderRejection {
        /// HTTP status or provider error number.
        status: u16,
        /// Provider supplied detail text.
        detail: String,
    },

    /// The provider did not answer in time.
    #[error("Provider did not respond within {timeout_seconds}s")]
    ProviderTimeout {
        /// The bounded wait that elapsed.
        timeout_seconds: f64,
    },

    /// The auto-retry controller gave up.
    #[error("{0}")]
    Exhausted(#[from] ExhaustedError),

    /// The run was cancelled before completion.
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Cancellation reason.
        reason: String,
        /// Attempts made before cancellation.
        history: Vec<AttemptRecord>,
    },

    /// Transport-level failure talking to the provider.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A processor definition could not be found.
    #[error("Processor not found: {0}")]
    ProcessorNotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a transport error.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Returns the taxonomy name used in JSON output.
    #[must_use]
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedPipeline(_) => "MalformedPipelineError",
            Self::InvalidParallelism(_) => "InvalidParallelismError",
            Self::TierUnavailable(_) => "TierUnavailableError",
            Self::ProviderRejection { .. } => "ProviderRejection",
            Self::ProviderTimeout { .. } => "ProviderTimeout",
            Self::Exhausted(_) => "Exhausted",
            Self::Cancelled { .. } => "Cancelled",
            Self::Provider(_) => "ProviderError",
            Self::Config(_) => "ConfigError",
            Self::ProcessorNotFound(_) => "ProcessorNotFound",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Whether the error stems from caller input rather than the provider.
    #[must_use]
    pub fn is_input_defect(&self) -> bool {
        matches!(
            self,
            Self::MalformedPipeline(_) | Self::InvalidParallelism(_) | Self::TierUnavailable(_)
        )
    }

    /// Converts to the JSON error body printed by the CLI.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("status".to_string(), json!("error"));
        map.insert("error_kind".to_string(), json!(self.error_kind()));
        map.insert("message".to_string(), json!(self.to_string()));

        match self {
            Self::MalformedPipeline(err) => {
                if let Some(index) = err.stage_index {
                    map.insert("stage_index".to_string(), json!(index));
                }
            }
            Self::InvalidParallelism(err) => {
                map.insert("stage_index".to_string(), json!(err.stage_index));
                map.insert("operator".to_string(), json!(err.operator));
                map.insert("declared".to_string(), err.declared.clone());
            }
            Self::TierUnavailable(err) => {
                map.insert("parallelism_total".to_string(), json!(err.parallelism_total));
                map.insert("complexity_score".to_string(), json!(err.complexity_score));
                map.insert("largest_tier".to_string(), json!(err.largest_tier));
            }
            Self::Exhausted(err) => {
                map.insert("reason".to_string(), json!(err.reason));
                map.insert("history".to_string(), json!(err.history));
            }
            Self::Cancelled { history, .. } => {
                map.insert("history".to_string(), json!(history));
            }
            _ => {}
        }

        map
    }
}

/// Error raised when a pipeline cannot be analyzed.
#[derive(Debug, Clone, Error)]
#[error("Malformed pipeline: {message}")]
pub struct MalformedPipelineError {
    /// The error message.
    pub message: String,
    /// Offending stage, when one can be named.
    pub stage_index: Option<usize>,
}

impl MalformedPipelineError {
    /// Creates a new malformed pipeline error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage_index: None,
        }
    }

    /// Sets the offending stage.
    #[must_use]
    pub fn at_stage(mut self, index: usize) -> Self {
        self.stage_index = Some(index);
        self
    }
}

/// Error raised when a stage declares parallelism below one or of the wrong type.
#[derive(Debug, Clone, Error)]
#[error("Invalid parallelism {declared} on stage {stage_index} ({operator}): must be an integer >= 1")]
pub struct InvalidParallelismError {
    /// Zero-based stage index.
    pub stage_index: usize,
    /// Stage operator name.
    pub operator: String,
    /// The value found in the definition.
    pub declared: serde_json::Value,
}

impl InvalidParallelismError {
    /// Creates a new invalid parallelism error.
    #[must_use]
    pub fn new(stage_index: usize, operator: impl Into<String>, declared: serde_json::Value) -> Self {
        Self {
            stage_index,
            operator: operator.into(),
            declared,
        }
    }
}

/// Error raised when no tier satisfies the computed requirement.
#[derive(Debug, Clone, Error)]
#[error(
    "No tier satisfies parallelism {parallelism_total} and complexity {complexity_score} \
     (largest tier {largest_tier} allows parallelism {largest_max_parallelism}); consider splitting the pipeline"
)]
pub struct TierUnavailableError {
    /// Computed billable parallelism.
    pub parallelism_total: u64,
    /// Computed complexity score.
    pub complexity_score: u64,
    /// Name of the largest tier in the table.
    pub largest_tier: String,
    /// Ceiling of the largest tier.
    pub largest_max_parallelism: u64,
}

/// Error raised when the auto-retry controller reaches its terminal failure state.
#[derive(Debug, Clone, Error)]
#[error("Start of '{processor}' exhausted after {} attempt(s): {reason}", history.len())]
pub struct ExhaustedError {
    /// Processor name.
    pub processor: String,
    /// Why no further attempt was made.
    pub reason: ExhaustReason,
    /// Ordered attempts with their rejection reasons.
    pub history: Vec<AttemptRecord>,
}

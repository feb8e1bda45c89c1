//! Batch advisory and batch start over many processors.
//!
//! Every processor is handled in isolation: one failure never aborts the
//! others. Work is bounded by a concurrency limit, results are keyed by
//! processor name, and cancellation stops new work while in-flight calls
//! finish.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::advisor::{Advisor, AdvisoryReport};
use crate::cancellation::CancellationToken;
use crate::catalog::ProcessorCatalog;
use crate::deploy::{AutoRetryController, Deployment};
use crate::errors::AdvisorError;
use crate::tiers::VolumeClass;

/// Default number of processors handled at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Result of `start` for one processor.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    /// Advisory used to pick the initial tier; absent when a tier was forced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<AdvisoryReport>,
    /// The accepted start.
    pub deployment: Deployment,
}

/// JSON shape of a failed processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessorFailure {
    /// Taxonomy name of the error.
    pub error_kind: String,
    /// Readable message.
    pub message: String,
    /// Structured context (history, totals, offending stage).
    #[serde(flatten)]
    pub context: BTreeMap<String, Value>,
}

impl From<&AdvisorError> for ProcessorFailure {
    fn from(err: &AdvisorError) -> Self {
        let mut context: BTreeMap<String, Value> = err.to_dict().into_iter().collect();
        context.remove("status");
        context.remove("error_kind");
        context.remove("message");
        Self {
            error_kind: err.error_kind().to_string(),
            message: err.to_string(),
            context,
        }
    }
}

/// Per-processor outcome, serialized with a `status` tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessorResult<T> {
    /// The processor succeeded.
    Ok(T),
    /// The processor failed.
    Error(ProcessorFailure),
}

impl<T> ProcessorResult<T> {
    /// Whether this is a success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl<T> From<Result<T, AdvisorError>> for ProcessorResult<T> {
    fn from(result: Result<T, AdvisorError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(err) => Self::Error(ProcessorFailure::from(&err)),
        }
    }
}

/// Overall batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every processor succeeded.
    Ok,
    /// At least one processor failed.
    Error,
}

/// Results of a batch run keyed by processor name.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    /// Overall status.
    pub status: BatchStatus,
    /// Run identifier.
    pub run_id: Uuid,
    /// Completion time.
    pub generated_at: DateTime<Utc>,
    /// Per-processor results.
    pub results: BTreeMap<String, ProcessorResult<T>>,
}

impl<T> BatchReport<T> {
    fn new(results: BTreeMap<String, ProcessorResult<T>>) -> Self {
        let status = if results.values().all(ProcessorResult::is_ok) {
            BatchStatus::Ok
        } else {
            BatchStatus::Error
        };
        Self {
            status,
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            results,
        }
    }

    /// Number of successful processors.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    /// Number of failed processors.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Batch report for advisory runs.
pub type AdvisoryBatch = BatchReport<AdvisoryReport>;
/// Batch report for start runs.
pub type StartBatch = BatchReport<StartReport>;

/// Drives advisory and start runs over a catalog.
pub struct BatchRunner {
    catalog: Arc<dyn ProcessorCatalog>,
    advisor: Advisor,
    controller: Option<Arc<AutoRetryController>>,
    concurrency: usize,
}

impl BatchRunner {
    /// Creates a runner without a start controller.
    #[must_use]
    pub fn new(catalog: Arc<dyn ProcessorCatalog>, advisor: Advisor) -> Self {
        Self {
            catalog,
            advisor,
            controller: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Attaches the controller used by start runs.
    #[must_use]
    pub fn with_controller(mut self, controller: Arc<AutoRetryController>) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Sets the concurrency limit (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Returns the concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Lists every processor the catalog knows.
    pub async fn list_names(&self) -> Result<Vec<String>, AdvisorError> {
        self.catalog.list_names().await
    }

    /// Advises on one processor.
    pub async fn advise(&self, name: &str, volume: Option<VolumeClass>) -> Result<AdvisoryReport, AdvisorError> {
        let definition = self.catalog.fetch_definition(name).await?;
        self.advisor.advise(&definition, volume)
    }

    /// Starts one processor, at `tier` when given or at the recommended tier.
    ///
    /// # Errors
    ///
    /// `Config` when no controller is attached, advisory errors when no tier
    /// was forced, and any controller error.
    pub async fn start(
        &self,
        name: &str,
        tier: Option<&str>,
        volume: Option<VolumeClass>,
        cancel: &CancellationToken,
    ) -> Result<StartReport, AdvisorError> {
        let controller = self
            .controller
            .as_ref()
            .ok_or_else(|| AdvisorError::config("starting processors requires Atlas credentials"))?;

        let (advisory, initial_tier) = match tier {
            Some(tier) => (None, tier.to_string()),
            None => {
                let report = self.advise(name, volume).await?;
                let tier = report.recommendation.tier.clone();
                (Some(report), tier)
            }
        };

        let deployment = controller.deploy(name, &initial_tier, cancel).await?;
        Ok(StartReport { advisory, deployment })
    }

    /// Advises on every named processor.
    pub async fn advise_all(
        &self,
        names: &[String],
        volume: Option<VolumeClass>,
        cancel: &CancellationToken,
    ) -> AdvisoryBatch {
        self.run_all(names, cancel, |name| async move { self.advise(&name, volume).await })
            .await
    }

    /// Starts every named processor.
    pub async fn start_all(
        &self,
        names: &[String],
        tier: Option<&str>,
        volume: Option<VolumeClass>,
        cancel: &CancellationToken,
    ) -> StartBatch {
        self.run_all(names, cancel, |name| async move { self.start(&name, tier, volume, cancel).await })
            .await
    }

    async fn run_all<'a, T, F, Fut>(&'a self, names: &[String], cancel: &'a CancellationToken, op: F) -> BatchReport<T>
    where
        F: Fn(String) -> Fut + 'a,
        Fut: Future<Output = Result<T, AdvisorError>> + 'a,
    {
        tracing::info!(processors = names.len(), concurrency = self.concurrency, "Batch started");

        let op = &op;
        let results: BTreeMap<String, ProcessorResult<T>> = stream::iter(names.iter().cloned())
            .map(|name| async move {
                if cancel.is_cancelled() {
                    return (name, ProcessorResult::from(Err(cancel.to_error(Vec::new()))));
                }
                let result = op(name.clone()).await;
                if let Err(err) = &result {
                    tracing::warn!(processor = %name, error_kind = err.error_kind(), error = %err, "Processor failed");
                }
                (name, ProcessorResult::from(result))
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = BatchReport::new(results);
        tracing::info!(
            run_id = %report.run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch finished"
        );
        report
    }
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("advisor", &self.advisor)
            .field("has_controller", &self.controller.is_some())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

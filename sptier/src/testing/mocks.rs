//! Mock providers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::catalog::ProcessorCatalog;
use crate::deploy::{ProcessorStarter, ProviderRejection, StartOutcome};
use crate::errors::AdvisorError;
use crate::pipeline::ProcessorDefinition;
use crate::tiers::TierTable;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Accept the start.
    Accept,
    /// Reject with this detail text (HTTP 400).
    Reject(String),
    /// Fail at the transport level.
    Fail(String),
    /// Never answer.
    Hang,
}

/// A starter that replays a fixed script and records every call.
///
/// Calls past the end of the script fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedStarter {
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedStarter {
    /// Creates a starter with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a reply.
    #[must_use]
    pub fn then(self, response: ScriptedResponse) -> Self {
        self.script.lock().push_back(response);
        self
    }

    /// Appends an acceptance.
    #[must_use]
    pub fn then_accept(self) -> Self {
        self.then(ScriptedResponse::Accept)
    }

    /// Appends a rejection.
    #[must_use]
    pub fn then_reject(self, detail: impl Into<String>) -> Self {
        self.then(ScriptedResponse::Reject(detail.into()))
    }

    /// Returns the `(processor, tier)` pairs requested so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    /// Returns the tiers requested so far.
    #[must_use]
    pub fn tiers_tried(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, tier)| tier.clone()).collect()
    }
}

#[async_trait]
impl ProcessorStarter for ScriptedStarter {
    async fn start_with_tier(&self, processor: &str, tier: &str) -> Result<StartOutcome, AdvisorError> {
        self.calls.lock().push((processor.to_string(), tier.to_string()));
        let next = self.script.lock().pop_front();
        match next {
            Some(ScriptedResponse::Accept) => Ok(StartOutcome::Accepted),
            Some(ScriptedResponse::Reject(detail)) => Ok(StartOutcome::Rejected(ProviderRejection::new(400, detail))),
            Some(ScriptedResponse::Fail(message)) => Err(AdvisorError::provider(message)),
            Some(ScriptedResponse::Hang) => {
                std::future::pending::<()>().await;
                Ok(StartOutcome::Accepted)
            }
            None => Err(AdvisorError::provider("script exhausted")),
        }
    }
}

/// A starter that behaves like the provider: it accepts any tier at or above
/// a per-processor minimum and otherwise rejects naming that minimum.
#[derive(Debug)]
pub struct ThresholdStarter {
    table: Arc<TierTable>,
    minimums: BTreeMap<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ThresholdStarter {
    /// Creates a starter where every processor accepts the smallest tier.
    #[must_use]
    pub fn new(table: Arc<TierTable>) -> Self {
        Self {
            table,
            minimums: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the minimum tier for one processor.
    #[must_use]
    pub fn with_minimum(mut self, processor: impl Into<String>, tier: impl Into<String>) -> Self {
        self.minimums.insert(processor.into(), tier.into());
        self
    }

    /// Returns the `(processor, tier)` pairs requested so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProcessorStarter for ThresholdStarter {
    async fn start_with_tier(&self, processor: &str, tier: &str) -> Result<StartOutcome, AdvisorError> {
        self.calls.lock().push((processor.to_string(), tier.to_string()));
        tokio::task::yield_now().await;

        let Some(minimum) = self.minimums.get(processor) else {
            return Ok(StartOutcome::Accepted);
        };
        match (self.table.rank(tier), self.table.rank(minimum)) {
            (Some(requested), Some(required)) if requested >= required => Ok(StartOutcome::Accepted),
            _ => Ok(StartOutcome::Rejected(ProviderRejection::new(
                400,
                format!("Invalid tier for this stream processor. Minimum tier for this workload: {minimum} or larger."),
            ))),
        }
    }
}

/// A catalog backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    definitions: BTreeMap<String, ProcessorDefinition>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition.
    #[must_use]
    pub fn with_definition(mut self, definition: ProcessorDefinition) -> Self {
        self.definitions.insert(definition.name.clone(), definition);
        self
    }
}

#[async_trait]
impl ProcessorCatalog for InMemoryCatalog {
    async fn fetch_definition(&self, name: &str) -> Result<ProcessorDefinition, AdvisorError> {
        self.definitions
            .get(name)
            .cloned()
            .ok_or_else(|| AdvisorError::ProcessorNotFound(name.to_string()))
    }

    async fn list_names(&self) -> Result<Vec<String>, AdvisorError> {
        Ok(self.definitions.keys().cloned().collect())
    }
}

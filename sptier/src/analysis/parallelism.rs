//! Billable parallelism accounting.
//!
//! Atlas bills and caps parallelism above the first unit of every stage, so a
//! stage declaring `parallelism: n` contributes `n - 1` and an undeclared stage
//! contributes nothing.

use serde::Serialize;

use crate::errors::AdvisorError;
use crate::pipeline::PipelineDefinition;

/// One stage that contributes to the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParallelismDetail {
    /// Stage index.
    pub index: usize,
    /// Operator key.
    pub operator: String,
    /// Declared parallelism.
    pub declared: u64,
    /// Contribution to the total (`declared - 1`).
    pub contribution: u64,
}

impl ParallelismDetail {
    /// Report line in the form used by the advisory output.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Stage {} ({}): parallelism={} (contributes {})",
            self.index + 1,
            self.operator,
            self.declared,
            self.contribution
        )
    }
}

/// Total plus the stages that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ParallelismAccount {
    /// Billable parallelism total.
    pub total: u64,
    /// Highest parallelism declared by any single stage.
    pub max_stage_parallelism: u64,
    /// Stages declaring parallelism above one.
    pub details: Vec<ParallelismDetail>,
}

/// Computes billable parallelism.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelismAccountant;

impl ParallelismAccountant {
    /// Creates a new accountant.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Computes the billable parallelism total.
    ///
    /// # Errors
    ///
    /// `InvalidParallelism` when any stage declares a value below one or a
    /// non-integer value.
    pub fn total(&self, pipeline: &PipelineDefinition) -> Result<u64, AdvisorError> {
        Ok(self.account(pipeline)?.total)
    }

    /// Computes the total with per-stage detail.
    pub fn account(&self, pipeline: &PipelineDefinition) -> Result<ParallelismAccount, AdvisorError> {
        let mut account = ParallelismAccount {
            max_stage_parallelism: u64::from(!pipeline.is_empty()),
            ..ParallelismAccount::default()
        };

        for stage in pipeline.stages() {
            let declared = stage.effective_parallelism()?;
            account.max_stage_parallelism = account.max_stage_parallelism.max(declared);

            let contribution = declared.saturating_sub(1);
            if contribution > 0 {
                account.total = account.total.saturating_add(contribution);
                account.details.push(ParallelismDetail {
                    index: stage.index,
                    operator: stage.operator.clone(),
                    declared,
                    contribution,
                });
            }
        }

        tracing::trace!(total = account.total, stages = pipeline.len(), "Parallelism accounted");
        Ok(account)
    }
}

/// Computes the billable parallelism total.
pub fn parallelism_total(pipeline: &PipelineDefinition) -> Result<u64, AdvisorError> {
    ParallelismAccountant.total(pipeline)
}

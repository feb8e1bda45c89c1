//! Pipeline complexity scoring.
//!
//! The score is a heuristic for CPU and memory burden. It is never billed; it
//! only biases the tier selector toward larger tiers for expensive logic.

use serde::Serialize;

use super::expressions::ExpressionSignals;
use super::script::ScriptSignals;
use crate::errors::AdvisorError;
use crate::pipeline::{PipelineDefinition, Stage, StageKind};

/// Weight per operation class.
///
/// These values are part of the advisor's observable behavior: changing them
/// changes recommendations, so they only move between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoringWeights {
    /// Filter/project style stages and anything unrecognized.
    pub simple: u64,
    /// Stages with arithmetic expressions or a single conditional.
    pub arithmetic: u64,
    /// Stages iterating arrays, and joins.
    pub iteration: u64,
    /// Stages with conditionals nested in conditionals.
    pub nested_conditional: u64,
    /// Grouping, windowed aggregation and other aggregate builders.
    pub aggregate: u64,
    /// Cap on the script sub-score of one custom-function stage.
    pub script_cap: u64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            simple: 1,
            arithmetic: 2,
            iteration: 3,
            nested_conditional: 4,
            aggregate: 5,
            script_cap: 5,
        }
    }
}

impl ScoringWeights {
    /// Base weight from the stage kind alone.
    #[must_use]
    pub fn base_weight(&self, kind: &StageKind) -> u64 {
        match kind {
            StageKind::Lookup => self.iteration,
            StageKind::Group | StageKind::Window => self.aggregate,
            StageKind::Source
            | StageKind::Match
            | StageKind::AddFields
            | StageKind::Project
            | StageKind::Merge
            | StageKind::Emit
            | StageKind::CustomFunction
            | StageKind::Unknown(_) => self.simple,
        }
    }

    /// Weight implied by expression signals; `simple` when there are none.
    #[must_use]
    pub fn signal_weight(&self, signals: &ExpressionSignals) -> u64 {
        if signals.aggregates > 0 {
            self.aggregate
        } else if signals.has_nested_conditionals() {
            self.nested_conditional
        } else if signals.iteration > 0 {
            self.iteration
        } else if signals.arithmetic > 0 || signals.conditionals > 0 {
            self.arithmetic
        } else {
            self.simple
        }
    }
}

/// Score contribution of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageScore {
    /// Stage index.
    pub index: usize,
    /// Operator key.
    pub operator: String,
    /// Classified kind.
    pub kind: StageKind,
    /// Class weight (max of kind and expression signals).
    pub weight: u64,
    /// Capped script sub-score, zero for non-function stages.
    pub script_score: u64,
    /// Human-readable factors behind the weight.
    pub reasons: Vec<String>,
}

impl StageScore {
    /// Total contribution of the stage.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.weight + self.script_score
    }
}

/// Score plus per-stage contributions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexityBreakdown {
    /// Sum of stage totals.
    pub score: u64,
    /// Contribution of every stage, in pipeline order.
    pub stages: Vec<StageScore>,
}

impl ComplexityBreakdown {
    /// Flattened "Stage N: reason" lines for reports.
    #[must_use]
    pub fn factors(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|stage| {
                stage
                    .reasons
                    .iter()
                    .map(move |reason| format!("Stage {} ({}): {reason}", stage.index + 1, stage.operator))
            })
            .collect()
    }
}

/// Deterministic complexity scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityScorer {
    weights: ScoringWeights,
}

impl ComplexityScorer {
    /// Creates a scorer with the given weights.
    #[must_use]
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Returns the weight table in use.
    #[must_use]
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Computes the complexity score.
    ///
    /// # Errors
    ///
    /// `MalformedPipeline` when the pipeline is empty or does not start with
    /// a source stage.
    pub fn score(&self, pipeline: &PipelineDefinition) -> Result<u64, AdvisorError> {
        Ok(self.breakdown(pipeline)?.score)
    }

    /// Computes the score with per-stage detail.
    pub fn breakdown(&self, pipeline: &PipelineDefinition) -> Result<ComplexityBreakdown, AdvisorError> {
        pipeline.validate_shape()?;

        let stages: Vec<StageScore> = pipeline.stages().iter().map(|s| self.score_stage(s)).collect();
        let score = stages.iter().map(StageScore::total).fold(0u64, u64::saturating_add);

        Ok(ComplexityBreakdown { score, stages })
    }

    /// Scores a single stage.
    #[must_use]
    pub fn score_stage(&self, stage: &Stage) -> StageScore {
        let w = &self.weights;
        let mut reasons = Vec::new();

        let base = w.base_weight(&stage.kind);
        match &stage.kind {
            StageKind::Lookup => reasons.push(format!("lookup/join (+{base})")),
            StageKind::Group => reasons.push(format!("grouping (+{base})")),
            StageKind::Window => reasons.push(format!("window aggregation (+{base})")),
            StageKind::Unknown(op) => reasons.push(format!("unrecognized operator {op} (+{base})")),
            _ => {}
        }

        let signals = ExpressionSignals::scan_stage(&stage.operator, &stage.body);
        let from_signals = w.signal_weight(&signals);
        if from_signals > base {
            reasons.push(signal_reason(&signals, from_signals));
        }
        let weight = base.max(from_signals);

        let script_score = match (&stage.kind, &stage.script_body) {
            (StageKind::CustomFunction, Some(script)) => {
                let script_signals = ScriptSignals::scan(script);
                let sub = script_signals.score(w.script_cap);
                reasons.push(format!(
                    "JavaScript function: {} loop(s), nesting {}, {} arithmetic op(s) (+{sub})",
                    script_signals.loops, script_signals.brace_depth, script_signals.arithmetic_ops
                ));
                sub
            }
            _ => 0,
        };

        StageScore {
            index: stage.index,
            operator: stage.operator.clone(),
            kind: stage.kind.clone(),
            weight,
            script_score,
            reasons,
        }
    }
}

fn signal_reason(signals: &ExpressionSignals, weight: u64) -> String {
    if signals.aggregates > 0 {
        format!("aggregate structure (+{weight})")
    } else if signals.has_nested_conditionals() {
        format!("nested conditionals, depth {} (+{weight})", signals.conditional_depth)
    } else if signals.iteration > 0 {
        format!("array iteration (+{weight})")
    } else {
        format!("arithmetic/conditional expressions (+{weight})")
    }
}

/// Scores a pipeline with the default weights.
pub fn score(pipeline: &PipelineDefinition) -> Result<u64, AdvisorError> {
    ComplexityScorer::default().score(pipeline)
}

//! Single-processor advisory: scorer, accountant and selector composed.

use serde::Serialize;
use std::sync::Arc;

use crate::analysis::{ComplexityScorer, ParallelismAccountant, StageScore};
use crate::errors::AdvisorError;
use crate::pipeline::{PipelineDefinition, ProcessorDefinition, StageKind};
use crate::tiers::{TierRecommendation, TierSelector, TierTable, VolumeClass};

const UNKNOWN_STAGE_PENALTY: f64 = 0.10;
const CUSTOM_FUNCTION_PENALTY: f64 = 0.05;
const MIN_CONFIDENCE: f64 = 0.3;

/// Supporting detail for a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    /// Number of stages.
    pub pipeline_stages: usize,
    /// Number of source and sink stages.
    pub connections_count: usize,
    /// Smallest tier admitting the complexity score alone.
    pub complexity_tier: Option<String>,
    /// Smallest tier whose ceiling covers the parallelism total alone.
    pub parallelism_tier: Option<String>,
    /// Highest parallelism declared by a single stage.
    pub max_stage_parallelism: u64,
    /// Per-stage score contributions.
    pub stage_scores: Vec<StageScore>,
    /// Readable complexity factors.
    pub complexity_factors: Vec<String>,
    /// Readable parallelism contributions.
    pub parallelism_details: Vec<String>,
    /// Operators the scorer did not recognize.
    pub unknown_operators: Vec<String>,
}

/// Full advisory output for one processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryReport {
    /// Processor name.
    pub processor: String,
    /// The recommendation.
    pub recommendation: TierRecommendation,
    /// Supporting detail.
    pub analysis: AnalysisSummary,
}

/// Stateless advisor over a shared tier table.
#[derive(Debug, Clone)]
pub struct Advisor {
    scorer: ComplexityScorer,
    accountant: ParallelismAccountant,
    selector: TierSelector,
}

impl Advisor {
    /// Creates an advisor with default scoring weights.
    #[must_use]
    pub fn new(table: Arc<TierTable>) -> Self {
        Self {
            scorer: ComplexityScorer::default(),
            accountant: ParallelismAccountant::new(),
            selector: TierSelector::new(table),
        }
    }

    /// Replaces the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: ComplexityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Returns the tier table.
    #[must_use]
    pub fn table(&self) -> &Arc<TierTable> {
        self.selector.table()
    }

    /// Advises on a processor definition.
    ///
    /// # Errors
    ///
    /// `MalformedPipeline`, `InvalidParallelism` or `TierUnavailable`; none of
    /// them is retried.
    pub fn advise(
        &self,
        processor: &ProcessorDefinition,
        volume: Option<VolumeClass>,
    ) -> Result<AdvisoryReport, AdvisorError> {
        let pipeline = processor.to_pipeline()?;
        self.advise_pipeline(&processor.name, &pipeline, volume)
    }

    /// Advises on an already classified pipeline.
    pub fn advise_pipeline(
        &self,
        name: &str,
        pipeline: &PipelineDefinition,
        volume: Option<VolumeClass>,
    ) -> Result<AdvisoryReport, AdvisorError> {
        let complexity = self.scorer.breakdown(pipeline)?;
        let parallelism = self.accountant.account(pipeline)?;
        let confidence = confidence_for(pipeline);

        let recommendation = self.selector.select_with_confidence(
            complexity.score,
            parallelism.total,
            volume,
            confidence,
        )?;

        let table = self.table();
        let analysis = AnalysisSummary {
            pipeline_stages: pipeline.len(),
            connections_count: pipeline.connections_count(),
            complexity_tier: table
                .tiers()
                .iter()
                .find(|t| t.admits_complexity(complexity.score))
                .map(|t| t.name.clone()),
            parallelism_tier: table
                .smallest_fitting(parallelism.total)
                .map(|t| t.name.clone()),
            max_stage_parallelism: parallelism.max_stage_parallelism,
            complexity_factors: complexity.factors(),
            parallelism_details: parallelism.details.iter().map(|d| d.describe()).collect(),
            unknown_operators: pipeline
                .stages()
                .iter()
                .filter_map(|s| match &s.kind {
                    StageKind::Unknown(op) => Some(op.clone()),
                    _ => None,
                })
                .collect(),
            stage_scores: complexity.stages,
        };

        tracing::info!(
            processor = name,
            tier = %recommendation.tier,
            complexity_score = recommendation.complexity_score,
            parallelism_total = recommendation.parallelism_total,
            "Advisory complete"
        );

        Ok(AdvisoryReport {
            processor: name.to_string(),
            recommendation,
            analysis,
        })
    }
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(TierTable::shared_default())
    }
}

/// Confidence falls with every stage the scorer can only estimate coarsely.
#[must_use]
pub fn confidence_for(pipeline: &PipelineDefinition) -> f64 {
    let (unknown, functions) = pipeline.stages().iter().fold((0u32, 0u32), |(u, f), stage| match stage.kind {
        StageKind::Unknown(_) => (u + 1, f),
        StageKind::CustomFunction => (u, f + 1),
        _ => (u, f),
    });
    let penalty = f64::from(unknown) * UNKNOWN_STAGE_PENALTY + f64::from(functions) * CUSTOM_FUNCTION_PENALTY;
    (1.0 - penalty).clamp(MIN_CONFIDENCE, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use serde_json::json;

    #[test]
    fn test_source_merge_scenario() {
        let report = Advisor::default()
            .advise(&fixtures::source_merge("basic"), None)
            .unwrap();
        let rec = &report.recommendation;
        assert_eq!(rec.tier, "SP2");
        assert_eq!(rec.complexity_score, 2);
        assert_eq!(rec.parallelism_total, 0);
        assert!((rec.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(report.analysis.connections_count, 2);
    }

    #[test]
    fn test_lookup_merge_scenario() {
        let report = Advisor::default()
            .advise(&fixtures::lookup_merge("enrich", 6, 8), None)
            .unwrap();
        assert_eq!(report.recommendation.parallelism_total, 12);
        assert_eq!(report.recommendation.tier, "SP30");
        assert_eq!(report.analysis.parallelism_tier.as_deref(), Some("SP30"));
        assert_eq!(report.analysis.parallelism_details.len(), 2);
        assert_eq!(report.analysis.max_stage_parallelism, 8);
    }

    #[test]
    fn test_errors_propagate_by_kind() {
        let advisor = Advisor::default();

        let empty = ProcessorDefinition::new("empty", vec![]);
        assert_eq!(advisor.advise(&empty, None).unwrap_err().error_kind(), "MalformedPipelineError");

        let zero = ProcessorDefinition::new(
            "zero",
            vec![json!({"$source": {}}), json!({"$merge": {"parallelism": 0}})],
        );
        assert_eq!(advisor.advise(&zero, None).unwrap_err().error_kind(), "InvalidParallelismError");

        let huge = fixtures::lookup_merge("huge", 60, 60);
        assert_eq!(advisor.advise(&huge, None).unwrap_err().error_kind(), "TierUnavailableError");
    }

    #[test]
    fn test_confidence_penalties() {
        let pipeline = PipelineDefinition::parse(&[
            json!({"$source": {}}),
            json!({"$https": {}}),
            json!({"$externalFunction": {}}),
            json!({"$set": {"x": {"$function": {"body": "function(){}", "args": [], "lang": "js"}}}}),
        ])
        .unwrap();
        assert!((confidence_for(&pipeline) - 0.75).abs() < 1e-9);

        let report = Advisor::default().advise_pipeline("p", &pipeline, None).unwrap();
        assert_eq!(report.analysis.unknown_operators, vec!["$https", "$externalFunction"]);
    }

    #[test]
    fn test_confidence_floor() {
        let mut stages = vec![json!({"$source": {}})];
        stages.extend((0..20).map(|i| {
            let mut stage = serde_json::Map::new();
            stage.insert(format!("$op{i}"), json!({}));
            serde_json::Value::Object(stage)
        }));
        let pipeline = PipelineDefinition::parse(&stages).unwrap();
        assert!((confidence_for(&pipeline) - MIN_CONFIDENCE).abs() < f64::EPSILON);
    }
}

//! Static analysis of processor pipelines.
//!
//! This module provides:
//! - `ComplexityScorer` for the weighted complexity heuristic
//! - `ParallelismAccountant` for the billable parallelism total
//! - Expression and script signal scanners used by the scorer

mod expressions;
mod parallelism;
mod scorer;
mod script;


pub use expressions::ExpressionSignals;
pub use parallelism::{
    parallelism_total, ParallelismAccount, ParallelismAccountant, ParallelismDetail,
};
pub use scorer::{score, ComplexityBreakdown, ComplexityScorer, ScoringWeights, StageScore};
pub use script::ScriptSignals;

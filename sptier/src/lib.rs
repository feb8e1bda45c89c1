//! # sptier
//!
//! Tier and parallelism advice for MongoDB Atlas Stream Processing.
//!
//! sptier reads a processor's aggregation pipeline and recommends the
//! cheapest processing tier that can run it:
//!
//! - **Complexity scoring**: weighs every stage by operator and expression shape
//! - **Parallelism accounting**: sums declared parallelism with the first unit free
//! - **Tier selection**: maps both numbers onto an ordered, immutable tier table
//! - **Auto-retry starts**: reads tier hints out of provider rejections and
//!   escalates, never repeating a tier
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sptier::prelude::*;
//!
//! let definition = ProcessorDefinition::from_json(&std::fs::read_to_string("orders.json")?)?;
//! let report = Advisor::default().advise(&definition, Some(VolumeClass::Medium))?;
//! println!("{} ({})", report.recommendation.tier, report.recommendation.reasoning);
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod advisor;
pub mod analysis;
pub mod batch;
pub mod cancellation;
pub mod catalog;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod pipeline;
pub mod testing;
pub mod tiers;

#[cfg(feature = "atlas")]
pub mod atlas;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::advisor::{AdvisoryReport, Advisor, AnalysisSummary};
    pub use crate::analysis::{ComplexityScorer, ParallelismAccountant, ScoringWeights};
    pub use crate::batch::{BatchReport, BatchRunner, ProcessorResult, StartReport};
    pub use crate::cancellation::CancellationToken;
    pub use crate::catalog::{LayeredCatalog, LocalCatalog, ProcessorCatalog};
    pub use crate::config::{AtlasSettings, RuntimeSettings, SpConfig};
    pub use crate::deploy::{
        AttemptRecord, AutoRetryController, Deployment, ExhaustReason, ProcessorStarter, ProviderRejection,
        RejectionParser, StartOutcome,
    };
    pub use crate::errors::AdvisorError;
    pub use crate::pipeline::{PipelineDefinition, ProcessorDefinition, Stage, StageKind};
    pub use crate::tiers::{SelectionDriver, Tier, TierRecommendation, TierSelector, TierTable, VolumeClass};

    #[cfg(feature = "atlas")]
    pub use crate::atlas::AtlasClient;
}

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Processor definitions and stage classification.
//!
//! This module provides:
//! - `ProcessorDefinition`, the serde view of a processor JSON document
//! - `PipelineDefinition` and `Stage`, the classified, immutable pipeline
//! - `StageKind`, the closed set of recognized operation kinds

mod definition;
mod kind;

pub use definition::{DeclaredParallelism, PipelineDefinition, ProcessorDefinition, Stage};
pub use kind::StageKind;

//! Testing utilities for advisor and deployment code.
//!
//! This module provides:
//! - Pipeline fixtures for the common processor shapes
//! - Scripted and threshold-based processor starters
//! - An in-memory processor catalog

pub mod fixtures;
mod mocks;

pub use mocks::{InMemoryCatalog, ScriptedResponse, ScriptedStarter, ThresholdStarter};

//! Starting processors with automatic tier escalation.
//!
//! This module provides:
//! - `ProcessorStarter`, the provider boundary for start requests
//! - `RejectionParser`, which reads tier hints out of rejection text
//! - `AutoRetryController`, the bounded escalation state machine

mod controller;
mod protocols;
mod rejection;

#[cfg(test)]
mod controller_tests;

pub use controller::{
    AttemptRecord, AttemptState, AutoRetryController, Deployment, ExhaustReason, DEFAULT_ATTEMPT_TIMEOUT,
};
pub use protocols::{ProcessorStarter, ProviderRejection, StartOutcome};
pub use rejection::{RejectionParser, TierHint};

#[cfg(test)]
pub use protocols::MockProcessorStarter;

//! Atlas Administration API boundary.
//!
//! This module provides:
//! - `AtlasClient`, implementing `ProcessorStarter` and `ProcessorCatalog`
//! - HTTP Digest authentication
//! - Backoff retries for transient read failures

mod client;
mod digest;
mod retry;

pub use client::{AtlasClient, ProcessorStatus, ACCEPT_DEFAULT, ACCEPT_TIER};
pub use digest::{DigestAlgorithm, DigestAuth, DigestChallenge};
pub use retry::{is_transient, with_retry, BackoffStrategy, JitterStrategy, RetryConfig};

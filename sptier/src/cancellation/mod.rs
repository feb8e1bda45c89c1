//! Cooperative cancellation.
//!
//! This module provides:
//! - CancellationToken, shared by batch runs and the retry controller
//! - StopListener, told the stop reason (the CLI logs it)

mod token;

pub use token::{CancellationToken, StopListener};

//! Tier table and tier selection.
//!
//! This module provides:
//! - `TierTable`, the ordered, read-only list of provider tiers
//! - `TierSelector`, which maps a complexity score and parallelism total to
//!   the cheapest sufficient tier
//! - `VolumeClass` and `CostEstimate` for cost display

mod selector;
mod table;
mod volume;


pub use selector::{SelectionDriver, TierRecommendation, TierSelector};
pub use table::{Tier, TierTable};
pub use volume::{CostEstimate, VolumeClass};

//! Per-run state for pipeline execution.
//!
//! This module provides:
//! - The slot store that holds stage results during a run
//! - Effective variable resolution
//! - Run identity for correlating logs and events

mod identity;
mod slots;
mod variables;

pub use identity::RunIdentity;
pub use slots::DataSlotStore;
pub use variables::{build_props, Expander, PlaceholderExpander, Variables, MAX_RESOLUTION_PASSES};

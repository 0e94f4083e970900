//! Pipeline configuration and execution.
//!
//! This module provides:
//! - Declarative pipeline, stage and merge configuration
//! - The orchestrator running the four execution modes
//! - Merge and statistics post-processing
//! - A registry of initialised pipelines

mod builder;
mod merge;
mod registry;
mod spec;
mod stats;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use merge::{MergeEngine, MergePlan};
pub use registry::PipelineRegistry;
pub use spec::{MergeSpec, PipelineConfig, StageConfig, StatsSlot};
pub use stats::StatsAggregator;

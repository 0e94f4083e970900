//! Lifecycle events emitted by pipeline runs.
//!
//! Sinks are attached per pipeline; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A run committed (or completed under XA) and released its connection.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A run failed.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A run was aborted cooperatively.
pub const PIPELINE_CANCELLED: &str = "pipeline.cancelled";
/// A stage is about to do its I/O.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished its I/O and stored its result.
pub const STAGE_COMPLETED: &str = "stage.completed";

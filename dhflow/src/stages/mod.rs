//! Stage trait and supporting types.
//!
//! A stage is one configured unit of database work: a write, a read, or a
//! combined write-then-read. Stage implementations live outside this crate
//! and are looked up by type name through the [`StageRegistry`].

mod registry;
mod result;

pub use registry::{register_stage_type, stage_registry, StageConstructor, StageRegistry};
pub use result::{Counters, DiscardCause, StageResult};

use crate::context::Variables;
use crate::core::Payload;
use crate::errors::PipelineError;
use crate::transaction::Connection;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for database-bound pipeline stages.
///
/// Every I/O method receives the run's connection and effective variables
/// explicitly and returns the stage's fresh counters together with any
/// payload it produced. A stage keeps no per-run state between calls, so one
/// instance can serve concurrent runs.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Writes `payload` to the database.
    async fn write(
        &self,
        payload: &Payload,
        connection: &mut dyn Connection,
        params: &Variables,
    ) -> Result<StageResult, PipelineError>;

    /// Reads from the database.
    async fn read(
        &self,
        connection: &mut dyn Connection,
        params: &Variables,
    ) -> Result<StageResult, PipelineError>;

    /// Writes `payload` and reads back in one database round.
    async fn write_then_read(
        &self,
        payload: &Payload,
        connection: &mut dyn Connection,
        params: &Variables,
    ) -> Result<StageResult, PipelineError>;

    /// Called once at the end of every run, after the connection is released,
    /// whether the run succeeded or not.
    ///
    /// Other runs of the same pipeline may still be inside this stage's I/O
    /// methods when it is called, so it must not touch anything those runs
    /// depend on. Errors are logged and otherwise ignored.
    fn cleanup(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Releases everything when the pipeline is torn down.
    fn destroy(&self) {}
}

/// A stage that touches nothing and reports zero counters.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(
        &self,
        _payload: &Payload,
        _connection: &mut dyn Connection,
        _params: &Variables,
    ) -> Result<StageResult, PipelineError> {
        Ok(StageResult::default())
    }

    async fn read(
        &self,
        _connection: &mut dyn Connection,
        _params: &Variables,
    ) -> Result<StageResult, PipelineError> {
        Ok(StageResult::default())
    }

    async fn write_then_read(
        &self,
        _payload: &Payload,
        _connection: &mut dyn Connection,
        _params: &Variables,
    ) -> Result<StageResult, PipelineError> {
        Ok(StageResult::default())
    }
}

//! Testing utilities for dhflow pipelines.
//!
//! This module provides:
//! - A recording connection provider with failure toggles
//! - Scripted stages that record every call
//! - Fixtures and assertions for end-to-end runs

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_committed_once, assert_connections_released, assert_counters,
    assert_no_transaction_control, assert_rolled_back_once,
};
pub use fixtures::{
    scripted_config, scripted_registry, transacted_pipeline, vars, TaggingTransformer,
    SCRIPTED_STAGE_TYPE,
};
pub use mocks::{
    ConnectionLog, RecordingConnection, RecordingConnectionProvider, ScriptedStage, StageCall,
    StageOp,
};

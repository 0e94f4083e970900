//! Core domain model types for dhflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage payloads
//! - Execution and forced-mode enums
//! - The typed run output

mod mode;
mod output;
mod payload;

pub use mode::{ExecutionMode, ForcedMode};
pub use output::RunOutput;
pub use payload::Payload;

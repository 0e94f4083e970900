//! # dhflow
//!
//! A transactional pipeline engine moving data between documents and
//! relational databases.
//!
//! A pipeline is a named, ordered list of database-bound stages sharing one
//! connection and one transaction per run. dhflow provides:
//!
//! - **Four execution modes**: push (document to rows), pull (rows to
//!   document), call (combined write and read) and execute (counters plus
//!   payload, with per-stage direction overrides)
//! - **Transaction discipline**: exactly one acquire and one release per run,
//!   commit on success, best-effort rollback on failure, XA pass-through
//! - **Slot-based data flow**: every stage result lands in a named slot of a
//!   per-run store
//! - **Post-processing**: path-addressed document merges and counter
//!   aggregation
//! - **Cooperative cancellation** checked before every stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dhflow::prelude::*;
//!
//! let registry = StageRegistry::new();
//! registry.register_fn("sql-select", |config| Ok(Arc::new(SelectStage::new(config)?) as Arc<dyn Stage>));
//!
//! let config = PipelineConfig::from_path("orders.json")?;
//! let pipeline = PipelineBuilder::init(config, &registry, provider)?;
//!
//! let document = pipeline.pull(Payload::Empty, &Variables::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod core;
pub mod document;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod transaction;
pub mod transform;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{DataSlotStore, Expander, PlaceholderExpander, RunIdentity, Variables};
    pub use crate::core::{ExecutionMode, ForcedMode, Payload, RunOutput};
    pub use crate::document::{Element, Node, NodePath};
    pub use crate::errors::{
        ConfigurationError, ContractErrorInfo, DataHandlingError, DatabaseError,
        DatabaseErrorKind, ErrorKind, MergeError, PipelineError, TransformError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{
        MergeEngine, MergeSpec, PipelineBuilder, PipelineConfig, PipelineRegistry,
        StageConfig, StatsAggregator, StatsSlot,
    };
    pub use crate::stages::{Counters, DiscardCause, Stage, StageRegistry, StageResult};
    pub use crate::transaction::{Connection, ConnectionProvider, TransactionContext};
    pub use crate::transform::Transformer;
}

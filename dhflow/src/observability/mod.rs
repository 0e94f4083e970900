//! Logging setup, run spans and payload dumps.

mod dump;
mod logging;
mod spans;

pub use dump::{dump_checkpoint, DumpCheckpoint, PayloadDump};
pub use logging::{init_logging, LogFormat};
pub use spans::{RunSpanAttributes, SpanTimer, StageSpanAttributes};

//! Debug dumps of payloads at fixed points of a run.

use crate::core::Payload;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use tracing::{debug, enabled, Level};

const PREVIEW_BYTES: usize = 64;

/// Where in a run a dump was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpCheckpoint {
    /// The caller's input, before any stage ran.
    Input,
    /// The payload handed to a stage.
    StageInput,
    /// The payload a stage produced.
    StageOutput,
    /// The value returned to the caller.
    Result,
}

impl DumpCheckpoint {
    /// Returns the checkpoint label used in log records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::StageInput => "stage-input",
            Self::StageOutput => "stage-output",
            Self::Result => "result",
        }
    }
}

/// Displays a payload for logging.
///
/// Documents render as XML, text as-is, and bytes as their size plus a
/// base64 preview of the first 64 bytes.
#[derive(Debug, Clone, Copy)]
pub struct PayloadDump<'a>(pub &'a Payload);

impl fmt::Display for PayloadDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Payload::Empty => f.write_str("<empty>"),
            Payload::Text(text) => f.write_str(text),
            Payload::Document(doc) => write!(f, "{doc}"),
            Payload::Bytes(bytes) => {
                let preview = &bytes[..bytes.len().min(PREVIEW_BYTES)];
                write!(f, "{} bytes: {}", bytes.len(), STANDARD.encode(preview))?;
                if bytes.len() > PREVIEW_BYTES {
                    f.write_str("...")?;
                }
                Ok(())
            }
        }
    }
}

/// Logs `payload` at DEBUG when dumping is enabled for the pipeline.
///
/// Rendering is skipped entirely unless both `make_dump` is set and DEBUG is
/// enabled for this target.
pub fn dump_checkpoint(make_dump: bool, pipeline: &str, checkpoint: DumpCheckpoint, stage: Option<&str>, payload: &Payload) {
    if !make_dump || !enabled!(Level::DEBUG) {
        return;
    }
    debug!(
        pipeline,
        checkpoint = checkpoint.as_str(),
        stage = stage.unwrap_or(""),
        kind = payload.kind(),
        "Dump: {}",
        PayloadDump(payload)
    );
}

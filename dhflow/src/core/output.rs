//! The typed result of a pipeline run.

use super::Payload;
use crate::stages::StageResult;
use serde::{Deserialize, Serialize};

/// What a run hands back to its caller, per execution mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RunOutput {
    /// Push runs only have side effects.
    Nothing,
    /// Pull and call runs return a document (or raw payload).
    Payload(Payload),
    /// Execute runs return counters plus payload.
    Result(StageResult),
}

impl RunOutput {
    /// Returns the payload carried by this output, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Nothing => None,
            Self::Payload(p) => Some(p),
            Self::Result(r) => Some(&r.payload),
        }
    }

    /// Returns the stage result, for execute runs.
    #[must_use]
    pub fn into_result(self) -> Option<StageResult> {
        match self {
            Self::Result(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the payload, for pull and call runs.
    #[must_use]
    pub fn into_payload(self) -> Option<Payload> {
        match self {
            Self::Payload(p) => Some(p),
            Self::Result(r) => Some(r.payload),
            Self::Nothing => None,
        }
    }
}

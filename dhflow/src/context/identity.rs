//! Run identity for tracking pipeline executions.

use crate::core::ExecutionMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique ID for this run.
    pub run_id: Uuid,
    /// The pipeline being run.
    pub pipeline: String,
    /// The execution mode of the run.
    pub mode: ExecutionMode,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

impl RunIdentity {
    /// Creates a new run identity with a generated run ID.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            mode,
            started_at: Utc::now(),
        }
    }

    /// Returns the run ID as a string.
    #[must_use]
    pub fn run_id_str(&self) -> String {
        self.run_id.to_string()
    }

    /// Converts to a JSON object for event payloads.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id.to_string(),
            "pipeline": self.pipeline,
            "mode": self.mode.as_str(),
            "started_at": self.started_at.to_rfc3339(),
        })
    }
}

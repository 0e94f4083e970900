//! Structured attributes and timing for run and stage events.

use crate::core::ExecutionMode;
use crate::stages::StageResult;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Attributes describing one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpanAttributes {
    /// Pipeline name.
    pub pipeline: String,
    /// Run ID.
    pub run_id: String,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Logical connection the run is bound to.
    pub connection: String,
    /// Whether the engine owns commit and rollback.
    pub manages_commit: bool,
    /// Number of configured stages.
    pub stage_count: usize,
    /// Wall time of the run, once finished.
    pub duration_ms: Option<f64>,
    /// Failure message, if the run failed.
    pub error: Option<String>,
}

impl RunSpanAttributes {
    /// Creates run attributes.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        run_id: impl Into<String>,
        mode: ExecutionMode,
        connection: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            run_id: run_id.into(),
            mode,
            connection: connection.into(),
            manages_commit: false,
            stage_count: 0,
            duration_ms: None,
            error: None,
        }
    }

    /// Sets whether the engine owns commit and rollback.
    #[must_use]
    pub fn with_manages_commit(mut self, manages_commit: bool) -> Self {
        self.manages_commit = manages_commit;
        self
    }

    /// Sets the configured stage count.
    #[must_use]
    pub fn with_stage_count(mut self, stage_count: usize) -> Self {
        self.stage_count = stage_count;
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Converts to an event payload. Unset optional fields are omitted.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        let mut data = serde_json::json!({
            "pipeline": self.pipeline,
            "run_id": self.run_id,
            "mode": self.mode.as_str(),
            "connection": self.connection,
            "manages_commit": self.manages_commit,
            "stage_count": self.stage_count,
        });
        if let Some(d) = self.duration_ms {
            data["duration_ms"] = serde_json::json!(d);
        }
        if let Some(ref e) = self.error {
            data["error"] = serde_json::json!(e);
        }
        data
    }
}

/// Attributes describing one stage step of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage: String,
    /// Position in the configured stage list.
    pub index: usize,
    /// Which stage operation ran: write, read or write_then_read.
    pub operation: Option<String>,
    /// Slot the stage read its input from.
    pub input_slot: Option<String>,
    /// Slot the stage's result was stored under.
    pub output_slot: Option<String>,
    /// Counters reported by the stage.
    pub counters: Option<crate::stages::Counters>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
}

impl StageSpanAttributes {
    /// Creates stage attributes.
    #[must_use]
    pub fn new(stage: impl Into<String>, index: usize) -> Self {
        Self {
            stage: stage.into(),
            index,
            ..Default::default()
        }
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets the input and output slots. Empty names are treated as unset.
    #[must_use]
    pub fn with_slots(mut self, input: &str, output: &str) -> Self {
        self.input_slot = Some(input.to_string()).filter(|s| !s.is_empty());
        self.output_slot = Some(output.to_string()).filter(|s| !s.is_empty());
        self
    }

    /// Records the stage's counters.
    #[must_use]
    pub fn with_result(mut self, result: &StageResult) -> Self {
        self.counters = Some(result.counters);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Converts to an event payload.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Counters;

    #[test]
    fn test_run_attributes_event_data() {
        let attrs = RunSpanAttributes::new("orders", "r-1", ExecutionMode::Push, "main")
            .with_manages_commit(true)
            .with_stage_count(2);
        let data = attrs.to_event_data();

        assert_eq!(data["pipeline"], "orders");
        assert_eq!(data["mode"], "XML2DB");
        assert_eq!(data["stage_count"], 2);
        assert!(data.get("error").is_none());

        let failed = attrs.with_duration_ms(1.5).with_error("boom").to_event_data();
        assert_eq!(failed["error"], "boom");
        assert_eq!(failed["duration_ms"], 1.5);
    }

    #[test]
    fn test_stage_attributes_event_data() {
        let result = StageResult::counters_only(Counters::new().with_insert(3).with_total(3));
        let data = StageSpanAttributes::new("load", 1)
            .with_operation("write")
            .with_slots("", "S2")
            .with_result(&result)
            .to_event_data();

        assert_eq!(data["stage"], "load");
        assert_eq!(data["operation"], "write");
        assert!(data["input_slot"].is_null());
        assert_eq!(data["output_slot"], "S2");
        assert_eq!(data["counters"]["insert"], 3);
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("run");
        assert_eq!(timer.name(), "run");
        assert!(timer.elapsed_ms() >= 0.0);
    }
}

//! Declarative pipeline and stage configuration.
//!
//! Field names on the wire follow the configuration attribute names
//! (`connection-name`, `output-data`, `xpath-source`, ...). Loading from disk
//! is a thin `serde_json` layer; anything richer belongs to the caller.

use crate::context::Variables;
use crate::core::ForcedMode;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Which slot supplies the statistics of an execute run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatsSlot {
    /// Sum the counters of every stage.
    All,
    /// Copy the counters of one slot.
    Slot(String),
}

impl StatsSlot {
    /// Sentinel that selects every stage.
    pub const ALL: &'static str = "ALL";
}

impl From<String> for StatsSlot {
    fn from(value: String) -> Self {
        if value == Self::ALL {
            Self::All
        } else {
            Self::Slot(value)
        }
    }
}

impl From<StatsSlot> for String {
    fn from(value: StatsSlot) -> Self {
        match value {
            StatsSlot::All => StatsSlot::ALL.to_string(),
            StatsSlot::Slot(name) => name,
        }
    }
}

/// Configuration of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, used in logs and errors.
    pub name: String,
    /// Registered stage type used to construct the stage.
    #[serde(rename = "type")]
    pub stage_type: String,
    /// Direction override.
    #[serde(default)]
    pub mode: ForcedMode,
    /// Transformation reference; empty means no transform.
    #[serde(default)]
    pub transformation: String,
    /// Slot this stage reads its input from.
    #[serde(default, rename = "input-data")]
    pub input_slot: String,
    /// Slot this stage writes its result to.
    #[serde(default, rename = "output-data")]
    pub output_slot: String,
    /// Whether the payload is returned when this stage's slot is the output.
    #[serde(default = "default_true", rename = "return-data")]
    pub return_data: bool,
    /// Connection name; inherited from the pipeline when absent.
    #[serde(default, rename = "connection-name", skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    /// Transacted flag; inherited from the pipeline when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transacted: Option<bool>,
    /// Stage-type-specific attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl StageConfig {
    /// Creates a stage configuration with defaults.
    #[must_use]
    pub fn new(name: impl Into<String>, stage_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage_type: stage_type.into(),
            mode: ForcedMode::Natural,
            transformation: String::new(),
            input_slot: String::new(),
            output_slot: String::new(),
            return_data: true,
            connection_name: None,
            transacted: None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the forced mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ForcedMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the transformation reference.
    #[must_use]
    pub fn with_transformation(mut self, reference: impl Into<String>) -> Self {
        self.transformation = reference.into();
        self
    }

    /// Sets the input slot.
    #[must_use]
    pub fn with_input(mut self, slot: impl Into<String>) -> Self {
        self.input_slot = slot.into();
        self
    }

    /// Sets the output slot.
    #[must_use]
    pub fn with_output(mut self, slot: impl Into<String>) -> Self {
        self.output_slot = slot.into();
        self
    }

    /// Sets the return-data flag.
    #[must_use]
    pub fn with_return_data(mut self, return_data: bool) -> Self {
        self.return_data = return_data;
        self
    }

    /// Adds a stage-specific attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A rule splicing one slot's document into the destination document.
///
/// The first rule of a pipeline only names the destination slot; its paths
/// are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    /// Slot holding the document to read.
    #[serde(rename = "source")]
    pub source_slot: String,
    /// Nodes to copy from the source document.
    #[serde(default, rename = "xpath-source", skip_serializing_if = "Option::is_none")]
    pub src_path: Option<String>,
    /// Node in the destination to append under.
    #[serde(default, rename = "xpath-dest", skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<String>,
}

impl MergeSpec {
    /// Creates the leading rule that names the destination slot.
    #[must_use]
    pub fn destination(slot: impl Into<String>) -> Self {
        Self {
            source_slot: slot.into(),
            src_path: None,
            dest_path: None,
        }
    }

    /// Creates a rule copying `src_path` nodes of `slot` under `dest_path`.
    #[must_use]
    pub fn new(slot: impl Into<String>, src_path: impl Into<String>, dest_path: impl Into<String>) -> Self {
        Self {
            source_slot: slot.into(),
            src_path: Some(src_path.into()),
            dest_path: Some(dest_path.into()),
        }
    }
}

/// Configuration of a whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    pub name: String,
    /// Connection name handed to the connection provider.
    #[serde(rename = "connection-name")]
    pub connection_name: String,
    /// Whether the engine commits and rolls back.
    #[serde(default)]
    pub transacted: bool,
    /// Whether an external XA coordinator completes the transaction.
    #[serde(default, rename = "isXA")]
    pub is_xa: bool,
    /// Ordered stage list.
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    /// Slot whose content is returned.
    #[serde(default, rename = "output-data")]
    pub output_slot: String,
    /// Slot supplying statistics for execute runs.
    #[serde(default, rename = "output-stats", skip_serializing_if = "Option::is_none")]
    pub stats_slot: Option<StatsSlot>,
    /// Merge rules; merging happens only with two or more.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<MergeSpec>,
    /// Base variables (name to expression).
    #[serde(default)]
    pub variables: Variables,
    /// Whether variables are re-expanded to a fixed point.
    #[serde(default, rename = "resolve-metadata")]
    pub resolve_metadata: bool,
    /// Whether payloads are dumped at debug level.
    #[serde(default, rename = "make-dump")]
    pub make_dump: bool,
}

impl PipelineConfig {
    /// Creates a configuration with no stages.
    #[must_use]
    pub fn new(name: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_name: connection_name.into(),
            transacted: false,
            is_xa: false,
            stages: Vec::new(),
            output_slot: String::new(),
            stats_slot: None,
            merges: Vec::new(),
            variables: Variables::new(),
            resolve_metadata: false,
            make_dump: false,
        }
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-PARSE` if the document is not a valid configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| {
            ConfigurationError::new(format!("Invalid pipeline configuration: {e}"))
                .with_error_info(ContractErrorInfo::new("CONFIG-PARSE", e.to_string()))
        })
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-PARSE` if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!("Cannot read {}: {e}", path.display()))
                .with_error_info(ContractErrorInfo::new("CONFIG-PARSE", e.to_string()))
        })?;
        Self::from_json_str(&text)
    }

    /// Sets the transacted flag.
    #[must_use]
    pub fn transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    /// Sets the XA flag.
    #[must_use]
    pub fn xa(mut self, is_xa: bool) -> Self {
        self.is_xa = is_xa;
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the output slot.
    #[must_use]
    pub fn with_output(mut self, slot: impl Into<String>) -> Self {
        self.output_slot = slot.into();
        self
    }

    /// Sets the statistics slot.
    #[must_use]
    pub fn with_stats(mut self, stats: StatsSlot) -> Self {
        self.stats_slot = Some(stats);
        self
    }

    /// Appends a merge rule.
    #[must_use]
    pub fn with_merge(mut self, merge: MergeSpec) -> Self {
        self.merges.push(merge);
        self
    }

    /// Adds a base variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.variables.insert(name.into(), expression.into());
        self
    }

    /// Sets the resolve-metadata flag.
    #[must_use]
    pub fn resolving_metadata(mut self, resolve: bool) -> Self {
        self.resolve_metadata = resolve;
        self
    }

    /// Sets the make-dump flag.
    #[must_use]
    pub fn dumping(mut self, make_dump: bool) -> Self {
        self.make_dump = make_dump;
        self
    }
}

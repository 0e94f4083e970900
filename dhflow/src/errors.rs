//! Error types for the dhflow engine.
//!
//! Every failure inside a run is a [`PipelineError`]. The public run surface
//! wraps it in a [`DataHandlingError`] that also carries the pipeline name and
//! the run id, so callers always know which pipeline failed and why.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The error raised inside a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad or missing pipeline/stage configuration.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// I/O failure from the connection or stage layer.
    #[error("{0}")]
    Database(#[from] DatabaseError),

    /// Failure raised by the transform collaborator.
    #[error("{0}")]
    Transform(#[from] TransformError),

    /// Failure while splicing documents together.
    #[error("{0}")]
    Merge(#[from] MergeError),

    /// The run was aborted cooperatively.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Anything else.
    #[error("{0:#}")]
    Generic(#[from] anyhow::Error),
}

impl PipelineError {
    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Database(_) => ErrorKind::Database,
            Self::Transform(_) => ErrorKind::Transform,
            Self::Merge(_) => ErrorKind::Merge,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Generic(_) => ErrorKind::Generic,
        }
    }

    /// Creates a generic error from a message.
    #[must_use]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic(anyhow::anyhow!(message.into()))
    }
}

/// Coarse error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`PipelineError::Configuration`].
    Configuration,
    /// See [`PipelineError::Database`].
    Database,
    /// See [`PipelineError::Transform`].
    Transform,
    /// See [`PipelineError::Merge`].
    Merge,
    /// See [`PipelineError::Cancelled`].
    Cancelled,
    /// See [`PipelineError::Generic`].
    Generic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Database => "database",
            Self::Transform => "transform",
            Self::Merge => "merge",
            Self::Cancelled => "cancelled",
            Self::Generic => "generic",
        };
        f.write_str(label)
    }
}

/// The error returned to callers of a pipeline run.
#[derive(Debug, Error)]
#[error("Data handling failed in pipeline '{pipeline}' (run {run_id}): {source}")]
pub struct DataHandlingError {
    /// Name of the pipeline that failed.
    pub pipeline: String,
    /// Identifier of the failed run.
    pub run_id: String,
    /// The underlying cause.
    #[source]
    pub source: PipelineError,
}

impl DataHandlingError {
    /// Wraps a pipeline error.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, run_id: impl Into<String>, source: PipelineError) -> Self {
        Self {
            pipeline: pipeline.into(),
            run_id: run_id.into(),
            source,
        }
    }

    /// Returns the classification of the underlying cause.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Returns true if the run was aborted rather than failed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, PipelineError::Cancelled(_))
    }
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONFIG-EMPTY").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline or stage configuration is unusable.
#[derive(Debug, Clone, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional structured error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the structured error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Vendor-neutral classification of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseErrorKind {
    /// Could not obtain or keep a connection.
    Connection,
    /// A constraint was violated.
    Constraint,
    /// The database chose this transaction as a deadlock victim.
    Deadlock,
    /// A statement or lock wait timed out.
    Timeout,
    /// Unclassified.
    #[default]
    Other,
}

/// Error raised by the connection or stage layer.
#[derive(Debug, Clone, Error)]
#[error("Database error ({kind:?}): {message}")]
pub struct DatabaseError {
    /// Classification supplied by whoever raised the error.
    pub kind: DatabaseErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Vendor-specific code (SQLSTATE, ORA-nnnnn, ...).
    pub vendor_code: Option<String>,
}

impl DatabaseError {
    /// Creates an unclassified database error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: DatabaseErrorKind::Other,
            message: message.into(),
            vendor_code: None,
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(DatabaseErrorKind::Connection)
    }

    /// Sets the classification.
    #[must_use]
    pub fn with_kind(mut self, kind: DatabaseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the vendor code.
    #[must_use]
    pub fn with_vendor_code(mut self, code: impl Into<String>) -> Self {
        self.vendor_code = Some(code.into());
        self
    }
}

/// Error raised by the transform collaborator.
#[derive(Debug, Clone, Error)]
#[error("Transform '{reference}' failed: {message}")]
pub struct TransformError {
    /// The transformation reference that failed.
    pub reference: String,
    /// What went wrong.
    pub message: String,
}

impl TransformError {
    /// Creates a new transform error.
    #[must_use]
    pub fn new(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while merging documents.
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    /// The destination path matched nothing.
    #[error("Merge destination path '{path}' matched no node")]
    UnmatchedDestination {
        /// The destination path.
        path: String,
    },

    /// A merge source slot was never populated.
    #[error("Merge source slot '{slot}' is empty")]
    MissingSlot {
        /// The slot name.
        slot: String,
    },

    /// A slot payload cannot be interpreted as a document.
    #[error("Slot '{slot}' does not hold a document")]
    NotADocument {
        /// The slot name.
        slot: String,
    },

    /// A document failed to parse.
    #[error("Malformed document: {0}")]
    Parse(String),
}

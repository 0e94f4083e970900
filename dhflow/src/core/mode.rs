//! Execution mode and forced-mode enums.

use crate::errors::{ConfigurationError, ContractErrorInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The pipeline-level execution mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Document to database; every stage writes the caller input.
    #[serde(rename = "XML2DB")]
    Push,
    /// Database to document; read stages produce slots, write stages chain.
    #[serde(rename = "DB2XML")]
    Pull,
    /// Every stage does a combined write and read.
    #[serde(rename = "CALL")]
    Call,
    /// Per-stage direction with counters.
    #[serde(rename = "EXECUTE")]
    Execute,
}

impl ExecutionMode {
    /// Returns the configuration token for this mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "XML2DB",
            Self::Pull => "DB2XML",
            Self::Call => "CALL",
            Self::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XML2DB" | "PUSH" => Ok(Self::Push),
            "DB2XML" | "PULL" => Ok(Self::Pull),
            "CALL" => Ok(Self::Call),
            "EXECUTE" => Ok(Self::Execute),
            _ => Err(unknown_token("execution mode", s)),
        }
    }
}

/// Per-stage override of the pipeline's read/write direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForcedMode {
    /// Follow the pipeline's mode.
    #[default]
    Natural,
    /// Always write.
    ForceToDb,
    /// Always read.
    ForceFromDb,
}

impl fmt::Display for ForcedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Natural => write!(f, "NATURAL"),
            Self::ForceToDb => write!(f, "FORCE_TO_DB"),
            Self::ForceFromDb => write!(f, "FORCE_FROM_DB"),
        }
    }
}

impl FromStr for ForcedMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "NATURAL" => Ok(Self::Natural),
            "FORCE_TO_DB" => Ok(Self::ForceToDb),
            "FORCE_FROM_DB" => Ok(Self::ForceFromDb),
            _ => Err(unknown_token("forced mode", s)),
        }
    }
}

fn unknown_token(what: &str, value: &str) -> ConfigurationError {
    ConfigurationError::new(format!("Unknown {what} '{value}'")).with_error_info(
        ContractErrorInfo::new("CONFIG-UNKNOWN-MODE", format!("'{value}' is not a valid {what}")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode_tokens() {
        assert_eq!("xml2db".parse::<ExecutionMode>().unwrap(), ExecutionMode::Push);
        assert_eq!("DB2XML".parse::<ExecutionMode>().unwrap(), ExecutionMode::Pull);
        assert_eq!(" call ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Call);
        assert_eq!("EXECUTE".parse::<ExecutionMode>().unwrap(), ExecutionMode::Execute);
        assert!("sideways".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Pull.to_string(), "DB2XML");
    }

    #[test]
    fn test_forced_mode_serde() {
        let mode: ForcedMode = serde_json::from_str("\"FORCE_FROM_DB\"").unwrap();
        assert_eq!(mode, ForcedMode::ForceFromDb);
        assert_eq!(serde_json::to_string(&ForcedMode::ForceToDb).unwrap(), "\"FORCE_TO_DB\"");
        assert_eq!(ForcedMode::default(), ForcedMode::Natural);
    }

    #[test]
    fn test_forced_mode_from_str() {
        assert_eq!("".parse::<ForcedMode>().unwrap(), ForcedMode::Natural);
        assert_eq!("force_to_db".parse::<ForcedMode>().unwrap(), ForcedMode::ForceToDb);
        let err = "maybe".parse::<ForcedMode>().unwrap_err();
        assert_eq!(err.code(), Some("CONFIG-UNKNOWN-MODE"));
    }
}

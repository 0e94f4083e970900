//! Test fixtures for pipeline testing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Variables;
use crate::core::Payload;
use crate::errors::{ConfigurationError, TransformError};
use crate::pipeline::{PipelineConfig, StageConfig};
use crate::stages::{Stage, StageRegistry};
use crate::transform::Transformer;

use super::mocks::ScriptedStage;

/// Stage type under which [`scripted_registry`] registers its stages.
pub const SCRIPTED_STAGE_TYPE: &str = "scripted";

/// Builds a registry whose `scripted` type resolves a stage config to the
/// given stage with the same name.
///
/// The stages are shared, so tests can inspect them after a run.
#[must_use]
pub fn scripted_registry(stages: &[Arc<ScriptedStage>]) -> StageRegistry {
    let by_name: HashMap<String, Arc<ScriptedStage>> = stages
        .iter()
        .map(|s| (s.name().to_string(), Arc::clone(s)))
        .collect();

    let registry = StageRegistry::new();
    registry.register_fn(SCRIPTED_STAGE_TYPE, move |config: &StageConfig| {
        by_name
            .get(&config.name)
            .map(|s| Arc::clone(s) as Arc<dyn Stage>)
            .ok_or_else(|| ConfigurationError::new(format!("no scripted stage named '{}'", config.name)))
    });
    registry
}

/// Creates a stage config of the scripted type.
#[must_use]
pub fn scripted_config(name: &str) -> StageConfig {
    StageConfig::new(name, SCRIPTED_STAGE_TYPE)
}

/// Creates a transacted, non-XA pipeline config on connection `main`.
#[must_use]
pub fn transacted_pipeline(name: &str, stages: Vec<StageConfig>) -> PipelineConfig {
    stages
        .into_iter()
        .fold(PipelineConfig::new(name, "main").transacted(true), PipelineConfig::with_stage)
}

/// Builds a variable map from pairs.
#[must_use]
pub fn vars(pairs: &[(&str, &str)]) -> Variables {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// A transformer that prefixes text payloads with the reference.
///
/// The reference `fail` always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggingTransformer;

impl Transformer for TaggingTransformer {
    fn transform(&self, reference: &str, input: Payload, _params: &Variables) -> Result<Payload, TransformError> {
        if reference == "fail" {
            return Err(TransformError::new(reference, "scripted transform failure"));
        }
        match input {
            Payload::Text(text) => Ok(Payload::Text(format!("{reference}:{text}"))),
            Payload::Empty => Ok(Payload::Text(format!("{reference}:"))),
            other => Ok(other),
        }
    }
}

//! Lookup of initialised pipelines by name.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use super::PipelineBuilder;

/// Concurrent map from pipeline name to an initialised pipeline.
///
/// Entries are shared; a pipeline fetched here may run on many tasks at once.
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<String, Arc<PipelineBuilder>>,
}

impl PipelineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pipeline under its configured name.
    ///
    /// A pipeline already registered under that name is replaced and
    /// destroyed.
    pub fn register(&self, pipeline: PipelineBuilder) -> Arc<PipelineBuilder> {
        let name = pipeline.name().to_string();
        let pipeline = Arc::new(pipeline);
        if let Some(previous) = self.pipelines.insert(name.clone(), Arc::clone(&pipeline)) {
            info!(pipeline = %name, "Replacing registered pipeline");
            previous.destroy();
        }
        pipeline
    }

    /// Returns the pipeline registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PipelineBuilder>> {
        self.pipelines.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns true if a pipeline is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// Lists registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Returns the number of registered pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Unregisters a pipeline and destroys its stages.
    ///
    /// Runs already holding the pipeline finish normally.
    pub fn remove(&self, name: &str) -> Option<Arc<PipelineBuilder>> {
        let (_, pipeline) = self.pipelines.remove(name)?;
        pipeline.destroy();
        info!(pipeline = %name, "Pipeline unregistered");
        Some(pipeline)
    }

    /// Unregisters and destroys every pipeline.
    pub fn clear(&self) {
        for name in self.names() {
            self.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::Stage;
    use crate::testing::{scripted_config, scripted_registry, transacted_pipeline, RecordingConnectionProvider, ScriptedStage};

    fn pipeline(name: &str, stage: &Arc<ScriptedStage>) -> PipelineBuilder {
        PipelineBuilder::init(
            transacted_pipeline(name, vec![scripted_config(stage.name())]),
            &scripted_registry(&[Arc::clone(stage)]),
            Arc::new(RecordingConnectionProvider::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = PipelineRegistry::new();
        let stage = Arc::new(ScriptedStage::new("s1"));
        registry.register(pipeline("orders", &stage));

        assert!(registry.contains("orders"));
        assert_eq!(registry.get("orders").unwrap().name(), "orders");
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["orders".to_string()]);
    }

    #[test]
    fn test_remove_destroys_stages() {
        let registry = PipelineRegistry::new();
        let stage = Arc::new(ScriptedStage::new("s1"));
        registry.register(pipeline("orders", &stage));

        assert!(registry.remove("orders").is_some());
        assert_eq!(stage.destroy_count(), 1);
        assert!(registry.is_empty());
        assert!(registry.remove("orders").is_none());
    }

    #[test]
    fn test_replacing_destroys_previous() {
        let registry = PipelineRegistry::new();
        let old = Arc::new(ScriptedStage::new("s1"));
        let new = Arc::new(ScriptedStage::new("s1"));
        registry.register(pipeline("orders", &old));
        registry.register(pipeline("orders", &new));

        assert_eq!(old.destroy_count(), 1);
        assert_eq!(new.destroy_count(), 0);
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert_eq!(new.destroy_count(), 1);
    }
}

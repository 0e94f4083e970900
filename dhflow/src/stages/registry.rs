//! Registry mapping stage type names to constructors.

use super::Stage;
use crate::errors::{ConfigurationError, ContractErrorInfo};
use crate::pipeline::StageConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Constructor for a stage type. Receives the stage's configuration with the
/// pipeline's connection name and transacted flag already bound.
pub type StageConstructor =
    Box<dyn Fn(&StageConfig) -> Result<Arc<dyn Stage>, ConfigurationError> + Send + Sync>;

/// Registry of stage constructors keyed by configured type name.
#[derive(Default)]
pub struct StageRegistry {
    constructors: RwLock<HashMap<String, StageConstructor>>,
}

impl StageRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one for the same type.
    pub fn register(&self, type_name: impl Into<String>, constructor: StageConstructor) {
        self.constructors.write().insert(type_name.into(), constructor);
    }

    /// Registers a constructor from a closure.
    pub fn register_fn<F>(&self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn(&StageConfig) -> Result<Arc<dyn Stage>, ConfigurationError> + Send + Sync + 'static,
    {
        self.register(type_name, Box::new(constructor));
    }

    /// Checks if a type is registered.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.read().contains_key(type_name)
    }

    /// Lists registered type names, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds the stage described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-UNKNOWN-STAGE-TYPE` if no constructor is registered
    /// for the configured type, or whatever the constructor rejects.
    pub fn create(&self, config: &StageConfig) -> Result<Arc<dyn Stage>, ConfigurationError> {
        let constructors = self.constructors.read();
        let constructor = constructors.get(&config.stage_type).ok_or_else(|| {
            ConfigurationError::new(format!(
                "Stage '{}' has unknown type '{}'",
                config.name, config.stage_type
            ))
            .with_stages(vec![config.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONFIG-UNKNOWN-STAGE-TYPE",
                    format!("No constructor registered for '{}'", config.stage_type),
                )
                .with_fix_hint("Register the stage type before initialising the pipeline."),
            )
        })?;
        constructor(config)
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.constructors.write().clear();
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<StageRegistry>> = OnceLock::new();

/// Gets the process-wide stage registry that stage implementations populate
/// at startup.
pub fn stage_registry() -> Arc<StageRegistry> {
    GLOBAL_REGISTRY.get_or_init(|| Arc::new(StageRegistry::new())).clone()
}

/// Registers a stage type in the process-wide registry.
pub fn register_stage_type<F>(type_name: impl Into<String>, constructor: F)
where
    F: Fn(&StageConfig) -> Result<Arc<dyn Stage>, ConfigurationError> + Send + Sync + 'static,
{
    stage_registry().register_fn(type_name, constructor);
}

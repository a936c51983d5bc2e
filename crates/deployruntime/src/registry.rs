use deploycore::{ConfigSchema, StepError, StepExecutor};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Factory trait for creating step executor instances
pub trait StepExecutorFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn StepExecutor>, StepError>;
}

impl<F> StepExecutorFactory for F
where
    F: Fn() -> Result<Arc<dyn StepExecutor>, StepError> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn StepExecutor>, StepError> {
        self()
    }
}

/// Static metadata about a step type
#[derive(Debug, Clone)]
pub struct StepTypeMetadata {
    pub step_type: String,
    pub description: String,
    pub schema: ConfigSchema,
}

/// Registry of available step types.
///
/// A flat table: the last registration for a type wins.
pub struct StepRegistry {
    factories: HashMap<String, Arc<dyn StepExecutorFactory>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory for a step type, replacing any existing one
    pub fn register(&mut self, step_type: impl Into<String>, factory: Arc<dyn StepExecutorFactory>) {
        let step_type = step_type.into();
        tracing::debug!("Registering step type: {}", step_type);
        if self.factories.insert(step_type.clone(), factory).is_some() {
            tracing::info!("Replaced executor for step type: {}", step_type);
        }
    }

    /// Register a single executor instance shared by every resolution
    pub fn register_executor(&mut self, step_type: impl Into<String>, executor: Arc<dyn StepExecutor>) {
        let factory = move || -> Result<Arc<dyn StepExecutor>, StepError> { Ok(executor.clone()) };
        self.register(step_type, Arc::new(factory));
    }

    /// Resolve an executor for a step type
    pub fn resolve(&self, step_type: &str) -> Result<Arc<dyn StepExecutor>, StepError> {
        let factory = self
            .factories
            .get(step_type)
            .ok_or_else(|| StepError::UnknownStepType(step_type.to_string()))?;

        factory.create().map_err(|e| {
            tracing::warn!("Failed to create executor for '{}': {}", step_type, e);
            StepError::UnknownStepType(step_type.to_string())
        })
    }

    pub fn has_executor(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }

    /// Get all registered step types
    pub fn list_types(&self) -> BTreeSet<String> {
        self.factories.keys().cloned().collect()
    }

    /// Get metadata for a step type
    pub fn metadata(&self, step_type: &str) -> Option<StepTypeMetadata> {
        let executor = self.resolve(step_type).ok()?;
        Some(StepTypeMetadata {
            step_type: step_type.to_string(),
            description: executor.description().to_string(),
            schema: executor.config_schema(),
        })
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

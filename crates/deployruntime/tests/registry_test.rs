use async_trait::async_trait;
use deploycore::{
    ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use deployruntime::{StepExecutorFactory, StepRegistry};
use std::sync::Arc;

struct NamedStep(&'static str);

#[async_trait]
impl StepExecutor for NamedStep {
    fn description(&self) -> &str {
        self.0
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().field("name", FieldSpec::new(FieldType::String, "A name").required())
    }

    async fn execute(&self, _ctx: StepContext) -> Result<Output, StepError> {
        Ok(Output::new())
    }
}

#[test]
fn test_resolve_unknown_type() {
    let registry = StepRegistry::new();

    let err = registry.resolve("build").err().unwrap();
    assert_eq!(err, StepError::UnknownStepType("build".into()));
    assert!(!registry.has_executor("build"));
    assert!(registry.metadata("build").is_none());
}

#[test]
fn test_last_registration_wins() {
    let mut registry = StepRegistry::new();
    registry.register_executor("build", Arc::new(NamedStep("first")));
    registry.register_executor("build", Arc::new(NamedStep("second")));

    let executor = registry.resolve("build").unwrap();
    assert_eq!(executor.description(), "second");
    assert_eq!(registry.list_types().len(), 1);
}

#[test]
fn test_closure_factories() {
    let mut registry = StepRegistry::new();
    let factory = || -> Result<Arc<dyn StepExecutor>, StepError> { Ok(Arc::new(NamedStep("fresh"))) };
    registry.register("deploy", Arc::new(factory));

    let broken = || -> Result<Arc<dyn StepExecutor>, StepError> {
        Err(StepError::ExecutorFailure("no credentials".into()))
    };
    registry.register("notify", Arc::new(broken));

    assert_eq!(registry.resolve("deploy").unwrap().description(), "fresh");
    assert_eq!(
        registry.resolve("notify").err(),
        Some(StepError::UnknownStepType("notify".into()))
    );
    assert!(registry.has_executor("notify"));
}

struct CountingFactory;

impl StepExecutorFactory for CountingFactory {
    fn create(&self) -> Result<Arc<dyn StepExecutor>, StepError> {
        Ok(Arc::new(NamedStep("counted")))
    }
}

#[test]
fn test_types_and_metadata() {
    let mut registry = StepRegistry::default();
    registry.register("verify", Arc::new(CountingFactory));
    registry.register_executor("build", Arc::new(NamedStep("Build Application")));

    let types: Vec<String> = registry.list_types().into_iter().collect();
    assert_eq!(types, vec!["build".to_string(), "verify".to_string()]);

    let metadata = registry.metadata("build").unwrap();
    assert_eq!(metadata.step_type, "build");
    assert_eq!(metadata.description, "Build Application");
    assert!(metadata.schema.get("name").unwrap().required);
}

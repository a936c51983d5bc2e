use crate::{
    Config, ConfigSchema, ExecutionId, FlowDefinition, Output, Step, StepError,
    StepExecutionRecord, StepLogger, TriggerContext,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Core trait that every step type implements
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Short human readable name, e.g. "Build Application"
    fn description(&self) -> &str;

    fn config_schema(&self) -> ConfigSchema;

    /// Check that every required schema field is present
    fn validate(&self, config: &Config) -> bool {
        self.config_schema().validate(config)
    }

    /// Perform the step's work
    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError>;

    /// Best-effort cancellation of a running step. Only local state is
    /// guaranteed to change; external work may keep going.
    async fn cancel(
        &self,
        _step: &StepExecutionRecord,
        log: &StepLogger,
    ) -> Result<(), StepError> {
        log.warn(format!("Cancelling {}", self.description()));
        Ok(())
    }
}

/// Everything a step executor sees while running
#[derive(Clone)]
pub struct StepContext {
    pub execution_id: ExecutionId,

    /// Definition of the step being executed
    pub step: Step,

    /// The step's own configuration
    pub config: Config,

    pub flow: Arc<FlowDefinition>,

    /// Trigger context exactly as the caller supplied it
    pub trigger: TriggerContext,

    /// Outputs of earlier successful steps, keyed by step id
    pub previous_outputs: HashMap<String, Output>,

    pub log: StepLogger,

    /// Tripped when the execution is cancelled
    pub cancellation: CancellationToken,
}

impl StepContext {
    /// Get a required config value or fail
    pub fn require_config(&self, name: &str) -> Result<&Value, StepError> {
        self.config
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| StepError::InvalidConfiguration(format!("Missing config: {}", name)))
    }

    /// Output of the latest earlier step of `step_type` that succeeded.
    pub fn previous_output_of_type(&self, step_type: &str) -> Option<&Output> {
        self.flow
            .enabled_steps()
            .into_iter()
            .rev()
            .filter(|s| s.step_type == step_type && s.id != self.step.id)
            .find_map(|s| self.previous_outputs.get(&s.id))
    }

    /// Like [`previous_output_of_type`](Self::previous_output_of_type) but
    /// fails with `MissingDependencyOutput`.
    pub fn require_output_of_type(&self, step_type: &str) -> Result<&Output, StepError> {
        self.previous_output_of_type(step_type)
            .ok_or_else(|| StepError::MissingDependencyOutput(step_type.to_string()))
    }

    /// Sleep that wakes early with `CancellationRequested` if the run is cancelled.
    pub async fn pause(&self, duration: Duration) -> Result<(), StepError> {
        if duration.is_zero() {
            return if self.cancellation.is_cancelled() {
                Err(StepError::CancellationRequested)
            } else {
                Ok(())
            };
        }

        tokio::select! {
            _ = self.cancellation.cancelled() => Err(StepError::CancellationRequested),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

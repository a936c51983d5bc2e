use crate::simulation::{into_output, narrate, run_logged, short_id, SimulationOptions};
use async_trait::async_trait;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::json;

/// Configures horizontal auto-scaling
pub struct ScaleStep {
    options: SimulationOptions,
}

impl ScaleStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let min_replicas = ctx.config.u64_or("min_replicas", 1);
        let max_replicas = ctx.config.u64_or("max_replicas", 10);
        let cpu_threshold = ctx.config.u64_or("cpu_threshold", 70);
        let memory_threshold = ctx.config.u64_or("memory_threshold", 80);

        if min_replicas > max_replicas {
            return Err(StepError::InvalidConfiguration(format!(
                "min_replicas ({}) is greater than max_replicas ({})",
                min_replicas, max_replicas
            )));
        }

        ctx.log.info(format!(
            "Configuring auto-scaling (min: {}, max: {})",
            min_replicas, max_replicas
        ));
        ctx.log.info(format!(
            "CPU threshold: {}%, Memory threshold: {}%",
            cpu_threshold, memory_threshold
        ));

        ctx.log.info("Setting up auto-scaling configuration...");
        narrate(
            ctx,
            &self.options,
            &[
                "Creating horizontal pod autoscaler...",
                "Configuring scaling metrics...",
                "Setting up scaling policies...",
                "Configuring scale-down stabilization...",
                "Setting up scale-up stabilization...",
                "Enabling scaling events logging...",
            ],
        )
        .await?;
        ctx.log.info("Auto-scaling configuration completed");

        Ok(into_output(json!({
            "min_replicas": min_replicas,
            "max_replicas": max_replicas,
            "cpu_threshold": cpu_threshold,
            "memory_threshold": memory_threshold,
            "scaling_policy_id": format!("hpa-{}", short_id()),
            "current_replicas": min_replicas,
            "scaling_rules": {
                "scale_up_on_cpu": format!("CPU > {}% for 2 minutes", cpu_threshold),
                "scale_up_on_memory": format!("Memory > {}% for 2 minutes", memory_threshold),
                "scale_down_on_cpu": "CPU < 30% for 5 minutes",
                "scale_down_on_memory": "Memory < 50% for 5 minutes",
            },
        })))
    }
}

impl Default for ScaleStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for ScaleStep {
    fn description(&self) -> &str {
        "Auto Scale"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "min_replicas",
                FieldSpec::new(FieldType::Integer, "Minimum number of replicas").with_default(1),
            )
            .field(
                "max_replicas",
                FieldSpec::new(FieldType::Integer, "Maximum number of replicas").with_default(10),
            )
            .field(
                "cpu_threshold",
                FieldSpec::new(FieldType::Integer, "CPU usage threshold for scaling (%)")
                    .with_default(70),
            )
            .field(
                "memory_threshold",
                FieldSpec::new(FieldType::Integer, "Memory usage threshold for scaling (%)")
                    .with_default(80),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

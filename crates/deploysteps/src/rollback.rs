use crate::simulation::{into_output, narrate, run_logged, short_id, yes_no, SimulationOptions};
use async_trait::async_trait;
use chrono::Utc;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::json;

/// Version reported as the rollback target when none is configured
const LAST_STABLE_VERSION: &str = "v1.2.3";

/// Returns the deployment to a previous version
pub struct RollbackStep {
    options: SimulationOptions,
}

impl RollbackStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let target_version = ctx.config.str_or("target_version", "previous");
        let strategy = ctx.config.str_or("strategy", "immediate");
        let preserve_data = ctx.config.bool_or("preserve_data", true);

        ctx.log
            .info(format!("Initiating rollback to version: {}", target_version));
        ctx.log.info(format!("Rollback strategy: {}", strategy));
        ctx.log
            .info(format!("Preserve data: {}", yes_no(preserve_data)));

        let rollback_id = format!("rollback-{}", short_id());
        ctx.log
            .info(format!("Starting rollback process: {}", rollback_id));
        narrate(
            ctx,
            &self.options,
            &[
                "Identifying previous stable version...",
                "Backing up current state...",
                "Preparing rollback environment...",
                "Deploying previous version...",
                "Verifying rollback success...",
                "Cleaning up failed deployment...",
            ],
        )
        .await?;
        ctx.log.info("Rollback completed successfully");

        let previous_version = if target_version == "previous" {
            LAST_STABLE_VERSION
        } else {
            target_version
        };

        Ok(into_output(json!({
            "target_version": target_version,
            "strategy": strategy,
            "preserve_data": preserve_data,
            "rollback_id": rollback_id,
            "status": "success",
            "previous_version": previous_version,
            "rollback_time": Utc::now().to_rfc3339(),
        })))
    }
}

impl Default for RollbackStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for RollbackStep {
    fn description(&self) -> &str {
        "Rollback on Failure"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "target_version",
                FieldSpec::new(FieldType::String, "Target version for rollback")
                    .with_default("previous"),
            )
            .field(
                "strategy",
                FieldSpec::new(FieldType::String, "Rollback strategy")
                    .with_default("immediate")
                    .with_options(["immediate", "gradual", "scheduled"]),
            )
            .field(
                "preserve_data",
                FieldSpec::new(FieldType::Boolean, "Preserve data during rollback").with_default(true),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

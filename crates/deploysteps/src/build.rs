use crate::simulation::{into_output, narrate, run_logged, SimulationOptions};
use async_trait::async_trait;
use chrono::Utc;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::{json, Value};

const BUILD_STAGES: &[&str] = &[
    "Preparing build context...",
    "Reading Dockerfile...",
    "Building image layers...",
    "Installing dependencies...",
    "Copying application files...",
    "Setting up runtime environment...",
    "Finalizing image...",
];

/// Builds the application image
pub struct BuildStep {
    options: SimulationOptions,
}

impl BuildStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let dockerfile = ctx.config.str_or("dockerfile", "Dockerfile");
        let context = ctx.config.str_or("context", ".");
        let image_tag = ctx.config.str_or("image_tag", "latest");
        let build_args = ctx
            .config
            .get("args")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));

        ctx.log
            .info(format!("Building Docker image with Dockerfile: {}", dockerfile));
        ctx.log.info(format!("Build context: {}", context));

        narrate(ctx, &self.options, BUILD_STAGES).await?;

        let execution = ctx.execution_id.simple().to_string();
        let image_name = format!(
            "deployflow/{}:{}-{}",
            ctx.flow.slug(),
            image_tag,
            &execution[..8]
        );
        ctx.log.info(format!("Built image {}", image_name));

        Ok(into_output(json!({
            "image_name": image_name,
            "image_tag": image_tag,
            "build_time": Utc::now().timestamp(),
            "dockerfile": dockerfile,
            "context": context,
            "build_args": build_args,
        })))
    }
}

impl Default for BuildStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for BuildStep {
    fn description(&self) -> &str {
        "Build Application"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "dockerfile",
                FieldSpec::new(FieldType::String, "Path to Dockerfile").with_default("Dockerfile"),
            )
            .field(
                "context",
                FieldSpec::new(FieldType::String, "Build context directory").with_default("."),
            )
            .field(
                "args",
                FieldSpec::new(FieldType::Array, "Build arguments").with_default(json!([])),
            )
            .field(
                "image_tag",
                FieldSpec::new(FieldType::String, "Image tag").with_default("latest"),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

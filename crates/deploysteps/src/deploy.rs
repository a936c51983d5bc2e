use crate::simulation::{into_output, narrate, run_logged, short_id, SimulationOptions};
use async_trait::async_trait;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::{json, Value};

pub(crate) const APP_URL: &str = "https://app.deployflow.io";

/// Replicas narrated one by one; the rest are reported in a single line
const NARRATED_REPLICAS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Rolling,
    BlueGreen,
    Canary,
}

impl Strategy {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "rolling" => Some(Strategy::Rolling),
            "blue_green" => Some(Strategy::BlueGreen),
            "canary" => Some(Strategy::Canary),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Strategy::Rolling => "rolling",
            Strategy::BlueGreen => "blue_green",
            Strategy::Canary => "canary",
        }
    }
}

/// Rolls the built image out to the target environment
pub struct DeployStep {
    options: SimulationOptions,
}

impl DeployStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let requested = ctx.config.str_or("strategy", "rolling");
        let replicas = ctx.config.u64_or("replicas", 1);
        let environment = ctx.config.str_or("environment", "production");

        let strategy = match Strategy::parse(requested) {
            Some(strategy) => strategy,
            None => {
                ctx.log.warn(format!(
                    "Unknown deployment strategy '{}', falling back to rolling",
                    requested
                ));
                Strategy::Rolling
            }
        };

        ctx.log
            .info(format!("Deploying with strategy: {}", strategy.as_str()));
        ctx.log.info(format!("Target replicas: {}", replicas));
        ctx.log.info(format!("Environment: {}", environment));

        let build = ctx.require_output_of_type("build")?;
        let image_name = build
            .get("image_name")
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::MissingDependencyOutput("build".to_string()))?
            .to_string();
        ctx.log.info(format!("Deploying image: {}", image_name));

        let deployment_id = format!("deploy-{}", short_id());
        let mut endpoints = json!({
            "primary": APP_URL,
            "health": format!("{}/health", APP_URL),
        });

        match strategy {
            Strategy::Rolling => {
                ctx.log
                    .info(format!("Starting rolling deployment: {}", deployment_id));
                narrate(
                    ctx,
                    &self.options,
                    &[
                        "Creating deployment configuration...",
                        "Validating deployment parameters...",
                        "Preparing deployment environment...",
                    ],
                )
                .await?;
                for i in 1..=replicas.min(NARRATED_REPLICAS) {
                    ctx.log.info(format!("Deploying replica {}/{}...", i, replicas));
                    ctx.pause(self.options.step_delay).await?;
                    ctx.log.info(format!("✓ Replica {} deployed successfully", i));
                }
                if replicas > NARRATED_REPLICAS {
                    let remaining = replicas - NARRATED_REPLICAS;
                    ctx.log.info(format!("Deploying remaining {} replicas...", remaining));
                    ctx.pause(self.options.step_delay).await?;
                    ctx.log.info(format!("✓ {} replicas deployed successfully", remaining));
                }
                ctx.log.info("Rolling deployment completed");
            }
            Strategy::BlueGreen => {
                ctx.log
                    .info(format!("Starting blue-green deployment: {}", deployment_id));
                narrate(
                    ctx,
                    &self.options,
                    &[
                        "Creating green environment...",
                        "Deploying to green environment...",
                        "Running health checks on green environment...",
                        "Switching traffic to green environment...",
                        "Monitoring green environment...",
                        "Cleaning up blue environment...",
                    ],
                )
                .await?;
                endpoints["green"] = json!("https://green.deployflow.io");
                ctx.log.info("Blue-green deployment completed");
            }
            Strategy::Canary => {
                ctx.log
                    .info(format!("Starting canary deployment: {}", deployment_id));
                narrate(
                    ctx,
                    &self.options,
                    &[
                        "Deploying canary version (10% traffic)...",
                        "Monitoring canary metrics...",
                        "Gradually increasing traffic to canary...",
                        "Running automated tests on canary...",
                        "Promoting canary to full deployment...",
                    ],
                )
                .await?;
                endpoints["canary"] = json!("https://canary.deployflow.io");
                ctx.log.info("Canary deployment completed");
            }
        }

        Ok(into_output(json!({
            "strategy": strategy.as_str(),
            "replicas": replicas,
            "environment": environment,
            "image_name": image_name,
            "deployment_id": deployment_id,
            "status": "success",
            "url": APP_URL,
            "endpoints": endpoints,
        })))
    }
}

impl Default for DeployStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for DeployStep {
    fn description(&self) -> &str {
        "Deploy to Server"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "strategy",
                FieldSpec::new(FieldType::String, "Deployment strategy")
                    .with_default("rolling")
                    .with_options(["rolling", "blue_green", "canary"]),
            )
            .field(
                "replicas",
                FieldSpec::new(FieldType::Integer, "Number of replicas to deploy").with_default(1),
            )
            .field(
                "environment",
                FieldSpec::new(FieldType::String, "Target environment").with_default("production"),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

use crate::simulation::{into_output, narrate, run_logged, yes_no, SimulationOptions};
use async_trait::async_trait;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::{json, Value};

const DASHBOARD_URL: &str = "https://monitoring.deployflow.io/dashboard";

const METRICS: &[&str] = &[
    "cpu_usage",
    "memory_usage",
    "disk_usage",
    "network_io",
    "response_time",
    "error_rate",
    "throughput",
];

/// Wires metrics and alerting up for a deployment
pub struct MonitorStep {
    options: SimulationOptions,
}

impl MonitorStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let metrics_enabled = ctx.config.bool_or("metrics_enabled", true);
        let alerts_enabled = ctx.config.bool_or("alerts_enabled", true);
        let interval = ctx.config.u64_or("monitoring_interval", 60);

        ctx.log
            .info(format!("Setting up monitoring (interval: {}s)", interval));
        ctx.log
            .info(format!("Metrics enabled: {}", yes_no(metrics_enabled)));
        ctx.log
            .info(format!("Alerts enabled: {}", yes_no(alerts_enabled)));

        let deploy = ctx.require_output_of_type("deploy")?;
        if let Some(deployment_id) = deploy.get("deployment_id").and_then(Value::as_str) {
            ctx.log.info(format!("Monitoring deployment {}", deployment_id));
        }

        ctx.log.info("Setting up monitoring infrastructure...");
        narrate(
            ctx,
            &self.options,
            &[
                "Configuring metrics collection...",
                "Setting up alerting rules...",
                "Creating monitoring dashboard...",
                "Configuring log aggregation...",
                "Setting up performance monitoring...",
                "Configuring uptime monitoring...",
            ],
        )
        .await?;
        ctx.log.info("Monitoring setup completed successfully");

        let alert_channels: Vec<&str> = if alerts_enabled {
            vec!["email", "slack", "webhook"]
        } else {
            Vec::new()
        };
        let metrics: Vec<&str> = if metrics_enabled {
            METRICS.to_vec()
        } else {
            Vec::new()
        };

        Ok(into_output(json!({
            "metrics_enabled": metrics_enabled,
            "alerts_enabled": alerts_enabled,
            "monitoring_interval": interval,
            "monitoring_dashboard": DASHBOARD_URL,
            "alert_channels": alert_channels,
            "metrics_collected": metrics,
        })))
    }
}

impl Default for MonitorStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for MonitorStep {
    fn description(&self) -> &str {
        "Start Monitoring"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "metrics_enabled",
                FieldSpec::new(FieldType::Boolean, "Enable metrics collection").with_default(true),
            )
            .field(
                "alerts_enabled",
                FieldSpec::new(FieldType::Boolean, "Enable alerting").with_default(true),
            )
            .field(
                "monitoring_interval",
                FieldSpec::new(FieldType::Integer, "Monitoring interval in seconds").with_default(60),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

use crate::simulation::{into_output, run_logged, SimulationOptions};
use async_trait::async_trait;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::json;

pub const SUPPORTED_CHANNELS: &[&str] = &["email", "slack", "discord", "webhook", "sms"];

/// Sends deployment notifications to the configured channels
pub struct NotifyStep {
    options: SimulationOptions,
}

impl NotifyStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let channels = ctx.config.strings_or("channels", &["email"]);
        let message = ctx
            .config
            .str_or("message", "Deployment completed successfully");
        let include_logs = ctx.config.bool_or("include_logs", false);

        ctx.log.info(format!(
            "Sending notifications to: {}",
            channels.join(", ")
        ));
        ctx.log.info(format!("Message: {}", message));

        let mut sent = 0u64;
        let mut failed = 0u64;
        for channel in &channels {
            ctx.log.info(format!("Sending notification via {}...", channel));
            if SUPPORTED_CHANNELS.contains(&channel.as_str()) {
                ctx.log.info(format!("✓ Notification sent via {}", channel));
                sent += 1;
            } else {
                ctx.log.warn(format!(
                    "✗ Failed to send notification via {}: unsupported channel",
                    channel
                ));
                failed += 1;
            }
            ctx.pause(self.options.step_delay).await?;
        }

        let delivery_status = match (sent, failed) {
            (_, 0) => "success",
            (0, _) => "failed",
            _ => "partial",
        };

        Ok(into_output(json!({
            "channels": channels,
            "message": message,
            "include_logs": include_logs,
            "notifications_sent": sent,
            "notifications_failed": failed,
            "delivery_status": delivery_status,
        })))
    }
}

impl Default for NotifyStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for NotifyStep {
    fn description(&self) -> &str {
        "Send Notifications"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "channels",
                FieldSpec::new(FieldType::Array, "Notification channels")
                    .with_default(json!(["email"]))
                    .with_options(SUPPORTED_CHANNELS.iter().copied()),
            )
            .field(
                "message",
                FieldSpec::new(FieldType::String, "Notification message")
                    .with_default("Deployment completed successfully"),
            )
            .field(
                "include_logs",
                FieldSpec::new(FieldType::Boolean, "Include execution logs in notification")
                    .with_default(false),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

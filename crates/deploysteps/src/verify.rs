use crate::simulation::{into_output, run_logged, SimulationOptions};
use async_trait::async_trait;
use chrono::Utc;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const HEALTH_CHECKS: &[&str] = &[
    "Basic connectivity check",
    "Application startup check",
    "Database connectivity check",
    "External service connectivity check",
    "Memory usage check",
    "CPU usage check",
];

/// Health checks the freshly deployed application.
///
/// By default the checks are simulated. With `http_probe` set, the step
/// performs real GET requests against the health URL.
pub struct VerifyStep {
    options: SimulationOptions,
    client: reqwest::Client,
}

impl VerifyStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self {
            options,
            client: reqwest::Client::new(),
        }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let health_check_url = ctx.config.str_or("health_check_url", "/health");
        let timeout = ctx.config.u64_or("timeout", 30);
        let retries = ctx.config.u64_or("retries", 3);
        let http_probe = ctx.config.bool_or("http_probe", false);

        ctx.log
            .info(format!("Running health checks on: {}", health_check_url));
        ctx.log
            .info(format!("Timeout: {}s, Retries: {}", timeout, retries));

        let deploy = ctx.require_output_of_type("deploy")?;
        let base_url = deploy
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::MissingDependencyOutput("deploy".to_string()))?;

        let full_url = if health_check_url.starts_with("http://")
            || health_check_url.starts_with("https://")
        {
            health_check_url.to_string()
        } else {
            format!("{}{}", base_url, health_check_url)
        };

        let (response_time, checks) = if http_probe {
            self.probe(ctx, &full_url, timeout, retries).await?
        } else {
            self.simulate(ctx, &full_url).await?
        };

        Ok(into_output(json!({
            "health_check_url": health_check_url,
            "full_url": full_url,
            "status": "healthy",
            "response_time": response_time,
            "checks_performed": checks,
            "timestamp": Utc::now().to_rfc3339(),
        })))
    }

    async fn simulate(&self, ctx: &StepContext, url: &str) -> Result<(u64, Vec<String>), StepError> {
        ctx.log.info(format!("Performing health checks on: {}", url));
        let started = Instant::now();

        for check in HEALTH_CHECKS {
            ctx.log.info(format!("Running: {}", check));
            ctx.pause(self.options.step_delay).await?;
            ctx.log.info(format!("✓ {} passed", check));
        }
        ctx.log.info("All health checks passed successfully");

        let elapsed = started.elapsed().as_millis() as u64;
        Ok((elapsed, HEALTH_CHECKS.iter().map(|c| c.to_string()).collect()))
    }

    async fn probe(
        &self,
        ctx: &StepContext,
        url: &str,
        timeout: u64,
        retries: u64,
    ) -> Result<(u64, Vec<String>), StepError> {
        let attempts = retries + 1;
        let mut checks = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            ctx.log
                .info(format!("GET {} (attempt {}/{})", url, attempt, attempts));
            checks.push(format!("GET {} (attempt {})", url, attempt));

            let started = Instant::now();
            let request = self
                .client
                .get(url)
                .timeout(Duration::from_secs(timeout.max(1)))
                .send();

            let result = tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(StepError::CancellationRequested),
                result = request => result,
            };

            match result {
                Ok(response) if response.status().is_success() => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    ctx.log.info(format!(
                        "✓ {} responded {} in {}ms",
                        url,
                        response.status().as_u16(),
                        elapsed
                    ));
                    return Ok((elapsed, checks));
                }
                Ok(response) => {
                    last_error = format!("unexpected status {}", response.status().as_u16());
                }
                Err(e) => {
                    last_error = format!("request failed: {}", e);
                }
            }

            ctx.log.warn(format!("Health check attempt {} failed: {}", attempt, last_error));
            if attempt < attempts {
                ctx.pause(self.options.step_delay).await?;
            }
        }

        Err(StepError::ExecutorFailure(format!(
            "Health check failed after {} attempts: {}",
            attempts, last_error
        )))
    }
}

impl Default for VerifyStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for VerifyStep {
    fn description(&self) -> &str {
        "Health Check"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "health_check_url",
                FieldSpec::new(FieldType::String, "Health check endpoint URL").with_default("/health"),
            )
            .field(
                "timeout",
                FieldSpec::new(FieldType::Integer, "Health check timeout in seconds").with_default(30),
            )
            .field(
                "retries",
                FieldSpec::new(FieldType::Integer, "Number of retry attempts").with_default(3),
            )
            .field(
                "http_probe",
                FieldSpec::new(FieldType::Boolean, "Perform real HTTP requests").with_default(false),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

use deploycore::{LogLevel, Output, StepContext, StepError};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

/// Knobs for the simulated step bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOptions {
    /// Pause after every narrated line. Zero runs the steps instantly.
    pub step_delay: Duration,
}

impl SimulationOptions {
    pub fn with_delay(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

/// Log each line and pause in between, stopping early on cancellation.
pub(crate) async fn narrate(
    ctx: &StepContext,
    options: &SimulationOptions,
    lines: &[&str],
) -> Result<(), StepError> {
    for line in lines {
        ctx.log.info(*line);
        ctx.pause(options.step_delay).await?;
    }
    Ok(())
}

/// Wrap a step body with the start / completion / failure log lines.
pub(crate) async fn run_logged<F>(
    ctx: &StepContext,
    description: &str,
    work: F,
) -> Result<Output, StepError>
where
    F: Future<Output = Result<Output, StepError>>,
{
    ctx.log.info(format!("Starting {}", description));
    match work.await {
        Ok(output) => {
            ctx.log.info(format!("Completed {}", description));
            Ok(output)
        }
        Err(e) => {
            ctx.log.log_with_context(
                LogLevel::Error,
                format!("Failed {}: {}", description, e),
                into_output(json!({ "step_id": ctx.step.id, "error": e.to_string() })),
            );
            Err(e)
        }
    }
}

pub(crate) fn into_output(value: Value) -> Output {
    match value {
        Value::Object(map) => map,
        _ => Output::new(),
    }
}

/// First 8 hex chars of a fresh v4 uuid, for generated resource ids
pub(crate) fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

use crate::simulation::{into_output, narrate, run_logged, SimulationOptions};
use async_trait::async_trait;
use deploycore::{
    ConfigExt, ConfigSchema, FieldSpec, FieldType, Output, StepContext, StepError, StepExecutor,
};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestSuite {
    Unit,
    Integration,
    E2e,
    All,
}

impl TestSuite {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "unit" => Some(TestSuite::Unit),
            "integration" => Some(TestSuite::Integration),
            "e2e" => Some(TestSuite::E2e),
            "all" => Some(TestSuite::All),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TestSuite::Unit => "unit",
            TestSuite::Integration => "integration",
            TestSuite::E2e => "e2e",
            TestSuite::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TestTally {
    passed: u64,
    failed: u64,
    skipped: u64,
    duration: u64,
}

impl std::ops::Add for TestTally {
    type Output = TestTally;

    fn add(self, other: TestTally) -> TestTally {
        TestTally {
            passed: self.passed.saturating_add(other.passed),
            failed: self.failed.saturating_add(other.failed),
            skipped: self.skipped.saturating_add(other.skipped),
            duration: self.duration.saturating_add(other.duration),
        }
    }
}

/// Runs the project's test suites
pub struct TestStep {
    options: SimulationOptions,
}

impl TestStep {
    pub fn new(options: SimulationOptions) -> Self {
        Self { options }
    }

    async fn run(&self, ctx: &StepContext) -> Result<Output, StepError> {
        let command = ctx.config.str_or("command", "npm test");
        let timeout = ctx.config.u64_or("timeout", 300);
        let requested = ctx.config.str_or("test_type", "unit");

        let suite = match TestSuite::parse(requested) {
            Some(suite) => suite,
            None => {
                ctx.log.warn(format!(
                    "Unknown test type '{}', running unit tests",
                    requested
                ));
                TestSuite::Unit
            }
        };

        ctx.log.info(format!("Running tests with command: {}", command));
        ctx.log.info(format!("Test type: {}", suite.as_str()));
        ctx.log.info(format!("Timeout: {} seconds", timeout));
        ctx.log.info(format!("Starting {} tests...", suite.as_str()));

        let mut tally = self.run_suite(ctx, suite).await?;
        tally.failed = tally
            .failed
            .saturating_add(ctx.config.u64_or("simulate_failures", 0));

        let results = json!({
            "passed": tally.passed,
            "failed": tally.failed,
            "skipped": tally.skipped,
            "duration": tally.duration,
        });

        if tally.failed > 0 {
            return Err(StepError::ExecutorFailure(format!(
                "{} of {} tests failed",
                tally.failed,
                tally.passed.saturating_add(tally.failed)
            )));
        }

        Ok(into_output(json!({
            "command": command,
            "test_type": suite.as_str(),
            "results": results,
            "passed": tally.passed,
            "failed": tally.failed,
            "skipped": tally.skipped,
            "duration": tally.duration,
        })))
    }

    async fn run_suite(&self, ctx: &StepContext, suite: TestSuite) -> Result<TestTally, StepError> {
        match suite {
            TestSuite::Unit => self.unit(ctx).await,
            TestSuite::Integration => self.integration(ctx).await,
            TestSuite::E2e => self.e2e(ctx).await,
            TestSuite::All => {
                ctx.log.info("Running all test suites...");
                let unit = self.unit(ctx).await?;
                let integration = self.integration(ctx).await?;
                let e2e = self.e2e(ctx).await?;
                Ok(unit + integration + e2e)
            }
        }
    }

    async fn unit(&self, ctx: &StepContext) -> Result<TestTally, StepError> {
        narrate(
            ctx,
            &self.options,
            &[
                "Loading test configuration...",
                "Setting up test environment...",
                "Running unit tests...",
                "✓ UserService tests passed (15/15)",
                "✓ AuthService tests passed (8/8)",
                "✓ ValidationService tests passed (12/12)",
                "✓ Utils tests passed (20/20)",
                "Generating test report...",
            ],
        )
        .await?;
        Ok(TestTally {
            passed: 55,
            failed: 0,
            skipped: 2,
            duration: 45,
        })
    }

    async fn integration(&self, ctx: &StepContext) -> Result<TestTally, StepError> {
        narrate(
            ctx,
            &self.options,
            &[
                "Setting up test database...",
                "Running integration tests...",
                "✓ API endpoints tests passed (25/25)",
                "✓ Database integration tests passed (18/18)",
                "✓ External service tests passed (12/12)",
                "Cleaning up test data...",
            ],
        )
        .await?;
        Ok(TestTally {
            passed: 55,
            failed: 0,
            skipped: 0,
            duration: 120,
        })
    }

    async fn e2e(&self, ctx: &StepContext) -> Result<TestTally, StepError> {
        narrate(
            ctx,
            &self.options,
            &[
                "Starting browser environment...",
                "Running end-to-end tests...",
                "✓ User registration flow passed",
                "✓ Login flow passed",
                "✓ Dashboard navigation passed",
                "✓ Settings update passed",
                "✓ Logout flow passed",
                "Closing browser...",
            ],
        )
        .await?;
        Ok(TestTally {
            passed: 5,
            failed: 0,
            skipped: 0,
            duration: 180,
        })
    }
}

impl Default for TestStep {
    fn default() -> Self {
        Self::new(SimulationOptions::default())
    }
}

#[async_trait]
impl StepExecutor for TestStep {
    fn description(&self) -> &str {
        "Run Tests"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                "command",
                FieldSpec::new(FieldType::String, "Test command to execute").with_default("npm test"),
            )
            .field(
                "timeout",
                FieldSpec::new(FieldType::Integer, "Test timeout in seconds").with_default(300),
            )
            .field(
                "test_type",
                FieldSpec::new(FieldType::String, "Type of tests to run")
                    .with_default("unit")
                    .with_options(["unit", "integration", "e2e", "all"]),
            )
            .field(
                "simulate_failures",
                FieldSpec::new(FieldType::Integer, "Number of failing tests to simulate")
                    .with_default(0),
            )
    }

    async fn execute(&self, ctx: StepContext) -> Result<Output, StepError> {
        run_logged(&ctx, self.description(), self.run(&ctx)).await
    }
}

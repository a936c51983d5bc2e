use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use deploycore::{ExecutionEvent, ExecutionStatus, FlowDefinition, FlowTemplate, LogLevel, TriggerContext};
use deployruntime::{DeployRuntime, ExecutionSummary, RuntimeConfig, StepRegistry};
use deploysteps::SimulationOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deployflow")]
#[command(about = "Deployment flow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Trigger payload as JSON
        #[arg(short, long)]
        trigger_data: Option<String>,

        /// Who triggered the run
        #[arg(short, long)]
        actor: Option<String>,

        /// Pause between simulated log lines, in milliseconds
        #[arg(long, default_value_t = 0)]
        simulate_delay_ms: u64,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available step types
    Steps,

    /// Create a flow from a template
    Init {
        /// simple, production, microservices or static_site
        #[arg(short, long, default_value = "simple")]
        template: String,

        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,

        /// Flow name
        #[arg(short, long, default_value = "My Deployment Flow")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            trigger_data,
            actor,
            simulate_delay_ms,
            verbose,
        } => {
            init_tracing(verbose);
            let options = SimulationOptions::with_delay(Duration::from_millis(simulate_delay_ms));
            run_flow(file, trigger_data, actor, options).await?;
        }

        Commands::Validate { file } => {
            validate_flow(file)?;
        }

        Commands::Steps => {
            list_steps();
        }

        Commands::Init {
            template,
            output,
            name,
        } => {
            create_flow(&template, output, name)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn builtin_registry(options: SimulationOptions) -> StepRegistry {
    let mut registry = StepRegistry::new();
    deploysteps::register_all_with(&mut registry, options);
    registry
}

async fn run_flow(
    file: PathBuf,
    trigger_data: Option<String>,
    actor: Option<String>,
    options: SimulationOptions,
) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let flow = deployruntime::load_flow(&file)
        .with_context(|| format!("failed to load {}", file.display()))?;

    println!("📋 Flow: {}", flow.name);
    println!("   Steps: {} ({} enabled)", flow.steps.len(), flow.enabled_steps().len());
    println!();

    let mut trigger = TriggerContext::manual();
    if let Some(data) = trigger_data {
        let payload: serde_json::Value =
            serde_json::from_str(&data).context("trigger data must be valid JSON")?;
        trigger = trigger.with_data(payload);
    }
    if let Some(actor) = actor {
        trigger = trigger.triggered_by(actor);
    }

    let runtime = DeployRuntime::with_registry(
        Arc::new(builtin_registry(options)),
        RuntimeConfig::default(),
    );

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
            if event.is_terminal() {
                break;
            }
        }
    });

    let handle = runtime.engine().spawn(flow, trigger).await?;
    let execution_id = handle.execution_id();

    let engine = Arc::clone(runtime.engine());
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("🛑 Interrupted, cancelling execution");
            engine.cancel(execution_id).await;
        }
    });

    let record = handle.wait().await?;
    interrupt.abort();
    let _ = tokio::time::timeout(Duration::from_millis(500), event_task).await;

    let summary = runtime.status(execution_id).await?;
    print_summary(&summary);

    if record.status != ExecutionStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionStarted { trigger_type, .. } => {
            println!("▶️  Execution started ({} trigger)", trigger_type);
        }
        ExecutionEvent::StepStarted {
            step_name,
            step_type,
            ..
        } => {
            println!("  ⚡ Starting step: {} ({})", step_name, step_type);
        }
        ExecutionEvent::StepCompleted {
            step_id,
            duration_ms,
            ..
        } => {
            println!("  ✅ Step {} completed in {}ms", step_id, duration_ms);
        }
        ExecutionEvent::StepFailed { step_id, error, .. } => {
            println!("  ❌ Step {} failed: {}", step_id, error);
        }
        ExecutionEvent::StepSkipped {
            step_id, reason, ..
        } => {
            println!("  ⏭️  Step {} skipped: {}", step_id, reason);
        }
        ExecutionEvent::StepLog { step_id, entry, .. } => match entry.level {
            LogLevel::Warning => println!("     ⚠️  [{}] {}", step_id, entry.message),
            LogLevel::Error => println!("     ❗ [{}] {}", step_id, entry.message),
            _ => println!("     ℹ️  [{}] {}", step_id, entry.message),
        },
        ExecutionEvent::ExecutionCompleted { duration_ms, .. } => {
            println!("✨ Execution completed successfully in {}ms", duration_ms);
        }
        ExecutionEvent::ExecutionFailed {
            error, duration_ms, ..
        } => {
            println!("💥 Execution failed after {}ms: {}", duration_ms, error);
        }
        ExecutionEvent::ExecutionCancelled { .. } => {
            println!("🛑 Execution cancelled");
        }
    }
}

fn print_summary(summary: &ExecutionSummary) {
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", summary.execution_id);
    println!("   Status: {}", summary.status);
    println!("   Progress: {}%", summary.progress);
    println!("   Duration: {}", summary.formatted_duration);

    if let Some(error) = &summary.error_message {
        println!("   Error: {}", error);
    }

    println!();
    for step in &summary.steps {
        print!("   {:<10} {} ({})", step.status.as_str(), step.step_name, step.duration_ms);
        match &step.error_message {
            Some(error) => println!("ms - {}", error),
            None => println!("ms"),
        }
    }
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let flow = deployruntime::load_flow(&file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    flow.validate()?;

    let registry = builtin_registry(SimulationOptions::default());
    let problems = check_steps(&flow, &registry);

    if !problems.is_empty() {
        println!("❌ Flow has {} problem(s):", problems.len());
        for problem in &problems {
            println!("   - {}", problem);
        }
        bail!("flow '{}' is invalid", flow.name);
    }

    println!("✅ Flow is valid:");
    println!("   Name: {}", flow.name);
    println!("   Steps: {} ({} enabled)", flow.steps.len(), flow.enabled_steps().len());

    Ok(())
}

fn check_steps(flow: &FlowDefinition, registry: &StepRegistry) -> Vec<String> {
    let mut problems = Vec::new();

    for step in &flow.steps {
        let executor = match registry.resolve(&step.step_type) {
            Ok(executor) => executor,
            Err(e) => {
                problems.push(format!("step '{}': {}", step.id, e));
                continue;
            }
        };

        let missing = executor.config_schema().missing_required(&step.config);
        if !missing.is_empty() {
            problems.push(format!(
                "step '{}': missing required field(s): {}",
                step.id,
                missing.join(", ")
            ));
        }
    }

    problems
}

fn list_steps() {
    println!("📦 Available Step Types:");
    println!();

    let registry = builtin_registry(SimulationOptions::default());

    for step_type in registry.list_types() {
        let Some(metadata) = registry.metadata(&step_type) else {
            println!("  • {}", step_type);
            continue;
        };

        println!("  • {} - {}", step_type, metadata.description);
        for (field, spec) in metadata.schema.fields() {
            let required = if spec.required { ", required" } else { "" };
            println!(
                "      {} ({}{}) default {}: {}",
                field,
                spec.field_type.as_str(),
                required,
                spec.default,
                spec.description
            );
        }
    }
}

fn create_flow(template: &str, output: PathBuf, name: String) -> Result<()> {
    let Some(template) = FlowTemplate::parse(template) else {
        let known: Vec<&str> = FlowTemplate::ALL.iter().map(|t| t.as_str()).collect();
        bail!("unknown template '{}', expected one of: {}", template, known.join(", "));
    };

    let flow = FlowDefinition::from_template(name, template);
    deployruntime::save_flow(&flow, &output)?;

    println!("✨ Created {} flow: {}", template.as_str(), output.display());
    println!();
    println!("Run it with:");
    println!("  deployflow run --file {}", output.display());

    Ok(())
}

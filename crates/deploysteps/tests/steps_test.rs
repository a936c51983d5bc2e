use deploycore::{
    EventBus, ExecutionEvent, ExecutionId, ExecutionStatus, FlowDefinition, FlowTemplate,
    LogLevel, Output, Step, StepContext, StepError, StepExecutor, StepStatus, TriggerContext,
};
use deployruntime::{DeployRuntime, RuntimeConfig, StepRegistry};
use deploysteps::{
    BuildStep, DeployStep, MonitorStep, NotifyStep, RollbackStep, ScaleStep, SimulationOptions,
    TestStep, VerifyStep, BUILTIN_STEP_TYPES,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// Helper function to create a test context for `step_id` within `flow`
fn create_test_context(
    flow: &FlowDefinition,
    step_id: &str,
    previous_outputs: HashMap<String, Output>,
) -> StepContext {
    let event_bus = EventBus::new(100);
    let execution_id = ExecutionId::new_v4();
    let step = flow.find_step(step_id).cloned().unwrap();

    StepContext {
        execution_id,
        config: step.config.clone(),
        log: event_bus.create_logger(execution_id, step.id.clone()),
        step,
        flow: Arc::new(flow.clone()),
        trigger: TriggerContext::manual(),
        previous_outputs,
        cancellation: CancellationToken::new(),
    }
}

fn pipeline() -> FlowDefinition {
    FlowDefinition::new("My App")
        .with_step(Step::new("build", "build").with_position(0).with_config("image_tag", "v2"))
        .with_step(Step::new("deploy", "deploy").with_position(1))
        .with_step(Step::new("verify", "verify").with_position(2))
        .with_step(Step::new("monitor", "monitor").with_position(3))
}

fn output(value: Value) -> Output {
    value.as_object().cloned().unwrap()
}

fn build_output() -> HashMap<String, Output> {
    HashMap::from([(
        "build".to_string(),
        output(json!({ "image_name": "deployflow/my-app:v2-abcdef12" })),
    )])
}

#[tokio::test]
async fn test_build_output_shape() {
    let flow = pipeline();
    let ctx = create_test_context(&flow, "build", HashMap::new());
    let execution = ctx.execution_id.simple().to_string();
    let log = ctx.log.clone();

    let output = BuildStep::default().execute(ctx).await.unwrap();

    assert_eq!(
        output["image_name"],
        format!("deployflow/my-app:v2-{}", &execution[..8])
    );
    assert_eq!(output["image_tag"], "v2");
    assert_eq!(output["dockerfile"], "Dockerfile");
    assert_eq!(output["context"], ".");
    assert_eq!(output["build_args"], json!([]));
    assert!(output["build_time"].is_i64());

    let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(messages.first().map(String::as_str), Some("Starting Build Application"));
    assert_eq!(messages.last().map(String::as_str), Some("Completed Build Application"));
}

#[tokio::test]
async fn test_test_step_suites() {
    let flow = FlowDefinition::new("Tests")
        .with_step(Step::new("unit", "test"))
        .with_step(Step::new("all", "test").with_config("test_type", "all"))
        .with_step(Step::new("odd", "test").with_config("test_type", "smoke"));
    let step = TestStep::default();

    let unit = step
        .execute(create_test_context(&flow, "unit", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(unit["test_type"], "unit");
    assert_eq!(unit["passed"], 55);
    assert_eq!(unit["skipped"], 2);
    assert_eq!(unit["results"]["duration"], 45);
    assert_eq!(unit["command"], "npm test");

    let all = step
        .execute(create_test_context(&flow, "all", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(all["passed"], 115);
    assert_eq!(all["failed"], 0);
    assert_eq!(all["duration"], 345);

    let ctx = create_test_context(&flow, "odd", HashMap::new());
    let log = ctx.log.clone();
    let odd = step.execute(ctx).await.unwrap();
    assert_eq!(odd["test_type"], "unit");
    assert!(log
        .entries()
        .iter()
        .any(|e| e.level == LogLevel::Warning && e.message.contains("smoke")));
}

#[tokio::test]
async fn test_test_step_fails_on_failed_tests() {
    let flow = FlowDefinition::new("Tests")
        .with_step(Step::new("unit", "test").with_config("simulate_failures", 3));

    let err = TestStep::default()
        .execute(create_test_context(&flow, "unit", HashMap::new()))
        .await
        .unwrap_err();

    assert_eq!(err, StepError::ExecutorFailure("3 of 58 tests failed".into()));
}

#[tokio::test]
async fn test_test_step_saturates_huge_failure_count() {
    let flow = FlowDefinition::new("Tests").with_step(
        Step::new("all", "test")
            .with_config("test_type", "all")
            .with_config("simulate_failures", u64::MAX),
    );

    let err = TestStep::default()
        .execute(create_test_context(&flow, "all", HashMap::new()))
        .await
        .unwrap_err();

    let expected = format!("{} of {} tests failed", u64::MAX, u64::MAX);
    assert_eq!(err, StepError::ExecutorFailure(expected));
}

#[tokio::test]
async fn test_deploy_requires_build_output() {
    let flow = pipeline();
    let err = DeployStep::default()
        .execute(create_test_context(&flow, "deploy", HashMap::new()))
        .await
        .unwrap_err();

    assert_eq!(err, StepError::MissingDependencyOutput("build".into()));
}

#[tokio::test]
async fn test_failed_step_logs_error_context() {
    let flow = pipeline();
    let ctx = create_test_context(&flow, "deploy", HashMap::new());
    let log = ctx.log.clone();

    DeployStep::default().execute(ctx).await.unwrap_err();

    let entries = log.entries();
    let failure = entries
        .iter()
        .find(|e| e.level == LogLevel::Error)
        .unwrap();
    assert_eq!(failure.context["step_id"], "deploy");
    assert_eq!(failure.context["error"], "Required output from 'build' step not found");
}

#[tokio::test]
async fn test_deploy_narrates_large_replica_counts_briefly() {
    let flow = FlowDefinition::new("Wide")
        .with_step(Step::new("build", "build").with_position(0))
        .with_step(
            Step::new("deploy", "deploy")
                .with_position(1)
                .with_config("replicas", 1_000_000),
        );
    let ctx = create_test_context(&flow, "deploy", build_output());
    let log = ctx.log.clone();

    let output = DeployStep::default().execute(ctx).await.unwrap();
    assert_eq!(output["replicas"], 1_000_000);

    let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
    assert!(messages.len() < 50);
    assert!(messages.contains(&"Deploying replica 10/1000000...".to_string()));
    assert!(!messages.contains(&"Deploying replica 11/1000000...".to_string()));
    assert!(messages.contains(&"Deploying remaining 999990 replicas...".to_string()));
}

#[tokio::test]
async fn test_deploy_output_shape() {
    let flow = pipeline();
    let output = DeployStep::default()
        .execute(create_test_context(&flow, "deploy", build_output()))
        .await
        .unwrap();

    assert_eq!(output["strategy"], "rolling");
    assert_eq!(output["replicas"], 1);
    assert_eq!(output["environment"], "production");
    assert_eq!(output["image_name"], "deployflow/my-app:v2-abcdef12");
    assert_eq!(output["status"], "success");
    assert_eq!(output["url"], "https://app.deployflow.io");
    assert_eq!(output["endpoints"]["health"], "https://app.deployflow.io/health");
    assert!(output["deployment_id"].as_str().unwrap().starts_with("deploy-"));
}

#[tokio::test]
async fn test_deploy_strategies() {
    let flow = FlowDefinition::new("Strategies")
        .with_step(Step::new("build", "build").with_position(0))
        .with_step(Step::new("canary", "deploy").with_position(1).with_config("strategy", "canary"))
        .with_step(Step::new("odd", "deploy").with_position(2).with_config("strategy", "yolo"));
    let step = DeployStep::default();

    let canary = step
        .execute(create_test_context(&flow, "canary", build_output()))
        .await
        .unwrap();
    assert_eq!(canary["strategy"], "canary");
    assert_eq!(canary["endpoints"]["canary"], "https://canary.deployflow.io");

    let ctx = create_test_context(&flow, "odd", build_output());
    let log = ctx.log.clone();
    let odd = step.execute(ctx).await.unwrap();
    assert_eq!(odd["strategy"], "rolling");
    assert!(log.entries().iter().any(|e| e.level == LogLevel::Warning));
}

#[tokio::test]
async fn test_verify_and_monitor_require_deploy_output() {
    let flow = pipeline();

    let err = VerifyStep::default()
        .execute(create_test_context(&flow, "verify", build_output()))
        .await
        .unwrap_err();
    assert_eq!(err, StepError::MissingDependencyOutput("deploy".into()));

    let err = MonitorStep::default()
        .execute(create_test_context(&flow, "monitor", build_output()))
        .await
        .unwrap_err();
    assert_eq!(err, StepError::MissingDependencyOutput("deploy".into()));
}

#[tokio::test]
async fn test_verify_and_monitor_output_shape() {
    let flow = pipeline();
    let mut previous = build_output();
    previous.insert(
        "deploy".to_string(),
        output(json!({ "url": "https://app.deployflow.io", "deployment_id": "deploy-1" })),
    );

    let verify = VerifyStep::default()
        .execute(create_test_context(&flow, "verify", previous.clone()))
        .await
        .unwrap();
    assert_eq!(verify["health_check_url"], "/health");
    assert_eq!(verify["full_url"], "https://app.deployflow.io/health");
    assert_eq!(verify["status"], "healthy");
    assert_eq!(verify["checks_performed"].as_array().unwrap().len(), 6);
    assert!(verify["response_time"].is_u64());
    assert!(verify["timestamp"].is_string());

    let monitor = MonitorStep::default()
        .execute(create_test_context(&flow, "monitor", previous))
        .await
        .unwrap();
    assert_eq!(monitor["monitoring_interval"], 60);
    assert_eq!(
        monitor["monitoring_dashboard"],
        "https://monitoring.deployflow.io/dashboard"
    );
    assert_eq!(monitor["alert_channels"], json!(["email", "slack", "webhook"]));
    assert_eq!(monitor["metrics_collected"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_verify_probe_reports_unreachable_endpoint() {
    let flow = FlowDefinition::new("Probe")
        .with_step(Step::new("deploy", "deploy").with_position(0))
        .with_step(
            Step::new("verify", "verify")
                .with_position(1)
                .with_config("http_probe", true)
                .with_config("health_check_url", "http://127.0.0.1:9/health")
                .with_config("retries", 0)
                .with_config("timeout", 2),
        );
    let previous = HashMap::from([(
        "deploy".to_string(),
        output(json!({ "url": "https://app.deployflow.io" })),
    )]);

    let err = VerifyStep::default()
        .execute(create_test_context(&flow, "verify", previous))
        .await
        .unwrap_err();

    match err {
        StepError::ExecutorFailure(message) => {
            assert!(message.starts_with("Health check failed after 1 attempts"), "{}", message)
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_notify_counts_unsupported_channels() {
    let flow = FlowDefinition::new("Notify")
        .with_step(Step::new("mixed", "notify").with_config("channels", json!(["email", "pager"])))
        .with_step(Step::new("bad", "notify").with_config("channels", json!(["pager", "fax"])))
        .with_step(Step::new("default", "notify"));
    let step = NotifyStep::default();

    let mixed = step
        .execute(create_test_context(&flow, "mixed", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(mixed["notifications_sent"], 1);
    assert_eq!(mixed["notifications_failed"], 1);
    assert_eq!(mixed["delivery_status"], "partial");

    let bad = step
        .execute(create_test_context(&flow, "bad", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(bad["delivery_status"], "failed");

    let default = step
        .execute(create_test_context(&flow, "default", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(default["channels"], json!(["email"]));
    assert_eq!(default["message"], "Deployment completed successfully");
    assert_eq!(default["include_logs"], false);
    assert_eq!(default["delivery_status"], "success");
}

#[tokio::test]
async fn test_rollback_output_shape() {
    let flow = FlowDefinition::new("Rollback")
        .with_step(Step::new("previous", "rollback"))
        .with_step(Step::new("pinned", "rollback").with_config("target_version", "v0.9.0"));
    let step = RollbackStep::default();

    let previous = step
        .execute(create_test_context(&flow, "previous", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(previous["target_version"], "previous");
    assert_eq!(previous["strategy"], "immediate");
    assert_eq!(previous["preserve_data"], true);
    assert_eq!(previous["status"], "success");
    assert!(previous["rollback_id"].as_str().unwrap().starts_with("rollback-"));

    let pinned = step
        .execute(create_test_context(&flow, "pinned", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(pinned["previous_version"], "v0.9.0");
}

#[tokio::test]
async fn test_scale_validates_replica_bounds() {
    let flow = FlowDefinition::new("Scale")
        .with_step(Step::new("ok", "scale").with_config("min_replicas", 2))
        .with_step(
            Step::new("bad", "scale")
                .with_config("min_replicas", 5)
                .with_config("max_replicas", 2),
        );
    let step = ScaleStep::default();

    let ok = step
        .execute(create_test_context(&flow, "ok", HashMap::new()))
        .await
        .unwrap();
    assert_eq!(ok["current_replicas"], 2);
    assert_eq!(ok["max_replicas"], 10);
    assert_eq!(ok["scaling_rules"]["scale_up_on_cpu"], "CPU > 70% for 2 minutes");
    assert!(ok["scaling_policy_id"].as_str().unwrap().starts_with("hpa-"));

    let err = step
        .execute(create_test_context(&flow, "bad", HashMap::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, StepError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn test_simulated_delay_honours_cancellation() {
    let flow = pipeline();
    let ctx = create_test_context(&flow, "build", HashMap::new());
    ctx.cancellation.cancel();

    let step = BuildStep::new(SimulationOptions::with_delay(Duration::from_secs(10)));
    let err = step.execute(ctx).await.unwrap_err();

    assert_eq!(err, StepError::CancellationRequested);
}

#[test]
fn test_register_all() {
    let mut registry = StepRegistry::new();
    deploysteps::register_all(&mut registry);

    let types: Vec<String> = registry.list_types().into_iter().collect();
    let mut expected: Vec<String> = BUILTIN_STEP_TYPES.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(types, expected);

    let deploy = registry.metadata("deploy").unwrap();
    assert_eq!(deploy.description, "Deploy to Server");
    assert_eq!(
        deploy.schema.get("strategy").unwrap().options.as_deref(),
        Some(&["rolling".to_string(), "blue_green".to_string(), "canary".to_string()][..])
    );
}

fn builtin_runtime(options: SimulationOptions) -> DeployRuntime {
    let mut registry = StepRegistry::new();
    deploysteps::register_all_with(&mut registry, options);
    DeployRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

#[tokio::test]
async fn test_templates_run_end_to_end() {
    let runtime = builtin_runtime(SimulationOptions::default());

    for template in FlowTemplate::ALL {
        let flow = FlowDefinition::from_template("Shop Frontend", template);
        let record = runtime.execute(&flow, TriggerContext::manual()).await.unwrap();

        assert_eq!(
            record.status,
            ExecutionStatus::Success,
            "{} failed: {:?}",
            template.as_str(),
            record.error_message
        );
        assert_eq!(record.progress(), 100);

        let summary = runtime.status(record.id).await.unwrap();
        assert!(summary.steps.iter().all(|s| s.status == StepStatus::Completed));
    }
}

#[tokio::test]
async fn test_deploy_without_build_fails_the_run() {
    let runtime = builtin_runtime(SimulationOptions::default());
    let flow = FlowDefinition::new("No build")
        .with_step(Step::new("deploy", "deploy").with_position(0))
        .with_step(Step::new("notify", "notify").with_position(1));

    let record = runtime.execute(&flow, TriggerContext::manual()).await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(
        record.error_message.as_deref(),
        Some("Required output from 'build' step not found")
    );
    assert_eq!(record.step_outcomes.len(), 1);
}

#[tokio::test]
async fn test_cancel_simulated_pipeline() {
    let runtime = builtin_runtime(SimulationOptions::with_delay(Duration::from_millis(200)));
    let mut events = runtime.subscribe_events();
    let flow = FlowDefinition::from_template("Slow", FlowTemplate::Simple);

    let handle = runtime.engine().spawn(flow, TriggerContext::manual()).await.unwrap();

    let started = async {
        while let Ok(event) = events.recv().await {
            if let ExecutionEvent::StepStarted { step_id, .. } = event {
                if step_id == "build" {
                    return;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), started)
        .await
        .unwrap();

    assert!(handle.cancel().await);
    let record = handle.wait().await.unwrap();

    assert_eq!(record.status, ExecutionStatus::Cancelled);
    assert_eq!(record.step_outcomes.len(), 1);
    assert_eq!(record.step_outcomes[0].status, StepStatus::Skipped);
}

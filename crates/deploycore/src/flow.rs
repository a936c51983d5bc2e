use crate::{Config, ExecutionStatus, FlowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

pub type FlowId = Uuid;

/// Reusable deployment pipeline template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub stats: FlowStats,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub settings: Config,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            template: None,
            steps: Vec::new(),
            stats: FlowStats::default(),
            is_active: true,
            settings: Config::new(),
        }
    }

    /// Build a flow from one of the predefined templates
    pub fn from_template(name: impl Into<String>, template: FlowTemplate) -> Self {
        let mut flow = Self::new(name);
        flow.template = Some(template.as_str().to_string());
        flow.steps = template.steps();
        flow
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.add_step(step);
        self
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn find_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn remove_step(&mut self, id: &str) -> Option<Step> {
        let index = self.steps.iter().position(|s| s.id == id)?;
        Some(self.steps.remove(index))
    }

    /// Shallow-merge a JSON object onto the step with the given id.
    pub fn update_step(&mut self, id: &str, patch: Value) -> Result<bool, FlowError> {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };

        let mut merged = serde_json::to_value(&*step)?;
        if let (Value::Object(target), Value::Object(fields)) = (&mut merged, patch) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        *step = serde_json::from_value(merged)?;
        Ok(true)
    }

    /// Keep only the listed steps, in the given order, with positions 0..n.
    pub fn reorder_steps<S: AsRef<str>>(&mut self, ids: &[S]) {
        let mut reordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut step) = self.find_step(id.as_ref()).cloned() {
                step.position = reordered.len() as i64;
                reordered.push(step);
            }
        }
        self.steps = reordered;
    }

    /// Enabled steps in execution order. Equal positions keep declaration order.
    pub fn enabled_steps(&self) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self.steps.iter().filter(|s| s.enabled).collect();
        steps.sort_by_key(|s| s.position);
        steps
    }

    /// Structural checks that must hold before a run can be created
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::EmptyFlow(self.id));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(FlowError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(())
    }

    /// Copy of this flow under a new identity; starts inactive with no history.
    pub fn duplicate(&self, new_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new_name.into(),
            description: Some(format!(
                "{} (Copy)",
                self.description.as_deref().unwrap_or_default()
            )),
            template: self.template.clone(),
            steps: self.steps.clone(),
            stats: FlowStats::default(),
            is_active: false,
            settings: self.settings.clone(),
        }
    }

    pub fn status(&self, latest: Option<ExecutionStatus>) -> FlowStatus {
        if !self.is_active {
            return FlowStatus::Inactive;
        }
        if self.stats.total_runs == 0 {
            return FlowStatus::NeverRun;
        }
        match latest {
            Some(status) => FlowStatus::Latest(status),
            None => FlowStatus::Unknown,
        }
    }

    /// Lowercase, dash-separated form of the name, usable in image names.
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        slug.split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

fn default_true() -> bool {
    true
}

/// One configured unit of work within a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub config: Config,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: impl Into<String>) -> Self {
        let step_type = step_type.into();
        Self {
            id: id.into(),
            name: step_type.clone(),
            step_type,
            position: 0,
            config: Config::new(),
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn non_critical(self) -> Self {
        self.with_config("critical", false)
    }

    /// Critical unless the config explicitly sets `critical = false`.
    pub fn is_critical(&self) -> bool {
        !matches!(self.config.get("critical"), Some(Value::Bool(false)))
    }
}

/// Aggregate run statistics stored on the flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Rolling average, in milliseconds
    pub average_duration_ms: u64,
    /// Percentage with two decimals
    pub success_rate: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl FlowStats {
    pub fn record(&mut self, outcome: RunOutcome, duration_ms: u64, at: DateTime<Utc>) {
        self.total_runs += 1;
        match outcome {
            RunOutcome::Success => self.successful_runs += 1,
            RunOutcome::Failure => self.failed_runs += 1,
        }
        self.last_run_at = Some(at);

        let previous_total = (self.average_duration_ms as f64) * (self.total_runs - 1) as f64;
        self.average_duration_ms =
            ((previous_total + duration_ms as f64) / self.total_runs as f64).round() as u64;

        self.success_rate = if self.total_runs > 0 {
            let rate = self.successful_runs as f64 / self.total_runs as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };
    }
}

/// Terminal outcome that counts towards flow statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

/// Derived, display-oriented status of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Inactive,
    NeverRun,
    Unknown,
    Latest(ExecutionStatus),
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStatus::Inactive => f.write_str("inactive"),
            FlowStatus::NeverRun => f.write_str("never_run"),
            FlowStatus::Unknown => f.write_str("unknown"),
            FlowStatus::Latest(status) => write!(f, "{}", status),
        }
    }
}

/// Predefined pipeline shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTemplate {
    Simple,
    Production,
    Microservices,
    StaticSite,
}

impl FlowTemplate {
    pub const ALL: [FlowTemplate; 4] = [
        FlowTemplate::Simple,
        FlowTemplate::Production,
        FlowTemplate::Microservices,
        FlowTemplate::StaticSite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowTemplate::Simple => "simple",
            FlowTemplate::Production => "production",
            FlowTemplate::Microservices => "microservices",
            FlowTemplate::StaticSite => "static_site",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn steps(&self) -> Vec<Step> {
        let steps = match self {
            FlowTemplate::Simple => vec![
                default_step("build", "Build Application"),
                default_step("test", "Run Tests"),
                default_step("deploy", "Deploy to Server"),
                default_step("verify", "Health Check"),
                default_step("monitor", "Start Monitoring"),
            ],
            FlowTemplate::Production => vec![
                default_step("build", "Build Application"),
                default_step("test", "Run Tests"),
                default_step("deploy", "Deploy to Production")
                    .with_config("strategy", "blue_green")
                    .with_config("replicas", 3),
                default_step("verify", "Health Check"),
                default_step("monitor", "Start Monitoring"),
            ],
            FlowTemplate::Microservices => vec![
                default_step("build", "Build Services"),
                default_step("test", "Integration Tests"),
                default_step("deploy", "Deploy Services").with_config("strategy", "canary"),
                Step::new("scale", "scale")
                    .with_name("Auto Scale")
                    .with_config("min_replicas", 2)
                    .with_config("max_replicas", 10)
                    .with_config("cpu_threshold", 70),
            ],
            FlowTemplate::StaticSite => vec![
                default_step("build", "Build Static Site")
                    .with_config("build_command", "npm run build"),
                default_step("deploy", "Deploy to CDN")
                    .with_config("strategy", "static")
                    .with_config("cdn_enabled", true),
                default_step("verify", "Verify Deployment"),
            ],
        };

        steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step.with_position(i as i64))
            .collect()
    }
}

fn default_step(step_type: &str, name: &str) -> Step {
    let config = match step_type {
        "build" => json!({ "dockerfile": "Dockerfile", "context": ".", "args": [] }),
        "test" => json!({ "command": "npm test", "timeout": 300 }),
        "deploy" => json!({ "strategy": "rolling", "replicas": 1 }),
        "verify" => json!({ "health_check_url": "/health", "timeout": 30 }),
        "monitor" => json!({ "metrics_enabled": true, "alerts_enabled": true }),
        _ => json!({}),
    };

    let mut step = Step::new(step_type, step_type).with_name(name);
    if let Value::Object(map) = config {
        step.config = map;
    }
    step
}

/// How a run was started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    #[default]
    Manual,
    Webhook,
    Scheduled,
    Api,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerType::Manual => "manual",
            TriggerType::Webhook => "webhook",
            TriggerType::Scheduled => "scheduled",
            TriggerType::Api => "api",
        };
        f.write_str(name)
    }
}

/// Caller-supplied trigger metadata, handed unmodified to every step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerContext {
    #[serde(default)]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_data: Value,
    #[serde(default)]
    pub metadata: Config,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

impl TriggerContext {
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.trigger_data = data;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn triggered_by(mut self, actor: impl Into<String>) -> Self {
        self.triggered_by = Some(actor.into());
        self
    }
}

use crate::{
    format_duration, Config, FlowId, LogEntry, LogLevel, Output, RecordError,
    StepExecutionRecord, StepStatus, TriggerContext, TriggerType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type ExecutionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized summary of one step attempt, embedded in the execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub step_name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&StepExecutionRecord> for StepOutcome {
    fn from(record: &StepExecutionRecord) -> Self {
        let completed = record.status == StepStatus::Completed;
        Self {
            step_id: record.step_id.clone(),
            step_name: record.step_name.clone(),
            status: record.status,
            duration_ms: record.duration_ms,
            output: completed.then(|| record.output.clone()),
            error: if completed {
                None
            } else {
                record.error_message.clone()
            },
        }
    }
}

/// Record of one triggered run of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub flow_id: FlowId,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub triggered_by: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_data: Value,
    pub logs: Vec<LogEntry>,
    /// Read-only projection of the step records, rebuilt by the engine
    pub step_outcomes: Vec<StepOutcome>,
    pub error_message: Option<String>,
    pub metadata: Config,
    /// Number of enabled steps when the run was created
    pub planned_steps: usize,
}

impl ExecutionRecord {
    pub fn new(
        id: ExecutionId,
        flow_id: FlowId,
        trigger: &TriggerContext,
        planned_steps: usize,
    ) -> Self {
        Self {
            id,
            flow_id,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            triggered_by: trigger.triggered_by.clone(),
            trigger_type: trigger.trigger_type,
            trigger_data: trigger.trigger_data.clone(),
            logs: Vec::new(),
            step_outcomes: Vec::new(),
            error_message: None,
            metadata: trigger.metadata.clone(),
            planned_steps,
        }
    }

    pub fn start(&mut self) -> Result<(), RecordError> {
        self.expect(&[ExecutionStatus::Pending], ExecutionStatus::Running)?;
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), RecordError> {
        self.expect(&[ExecutionStatus::Running], ExecutionStatus::Success)?;
        self.finish(ExecutionStatus::Success);
        Ok(())
    }

    /// Also allowed from `pending`, for fatal preconditions detected before start.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), RecordError> {
        self.expect(
            &[ExecutionStatus::Pending, ExecutionStatus::Running],
            ExecutionStatus::Failed,
        )?;
        self.finish(ExecutionStatus::Failed);
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), RecordError> {
        self.expect(&[ExecutionStatus::Running], ExecutionStatus::Cancelled)?;
        self.finish(ExecutionStatus::Cancelled);
        Ok(())
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
    }

    pub fn add_log_with_context(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        context: Config,
    ) {
        self.logs
            .push(LogEntry::new(level, message).with_context(context));
    }

    /// Replace the embedded step outcomes with a projection of `steps`.
    pub fn rebuild_outcomes(&mut self, steps: &[StepExecutionRecord]) {
        self.step_outcomes = steps
            .iter()
            .filter(|s| s.is_terminal())
            .map(StepOutcome::from)
            .collect();
    }

    /// Percentage of planned steps that completed, rounded.
    pub fn progress(&self) -> u8 {
        let completed = self
            .step_outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Completed)
            .count();
        progress_percentage(completed, self.planned_steps)
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration_ms)
    }

    fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
    }

    fn expect(&self, allowed: &[ExecutionStatus], to: ExecutionStatus) -> Result<(), RecordError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(RecordError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }
}

/// round(100 * completed / total), or 0 when nothing is planned.
pub fn progress_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (completed as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

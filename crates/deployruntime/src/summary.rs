use chrono::{DateTime, Utc};
use deploycore::{
    format_duration, progress_percentage, ExecutionId, ExecutionRecord, ExecutionStatus, FlowId,
    LogEntry, StepExecutionRecord, StepStatus,
};
use serde::Serialize;

/// Per-step view inside an [`ExecutionSummary`]
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step_id: String,
    pub step_type: String,
    pub step_name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub logs: Vec<LogEntry>,
}

impl From<&StepExecutionRecord> for StepSummary {
    fn from(record: &StepExecutionRecord) -> Self {
        Self {
            step_id: record.step_id.clone(),
            step_type: record.step_type.clone(),
            step_name: record.step_name.clone(),
            status: record.status,
            duration_ms: record.duration_ms,
            error_message: record.error_message.clone(),
            logs: record.logs.clone(),
        }
    }
}

/// Point-in-time view of an execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub flow_id: FlowId,
    pub status: ExecutionStatus,
    pub progress: u8,
    pub duration_ms: u64,
    pub formatted_duration: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub steps: Vec<StepSummary>,
    pub logs: Vec<LogEntry>,
}

impl ExecutionSummary {
    pub fn new(execution: &ExecutionRecord, steps: &[StepExecutionRecord]) -> Self {
        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();

        Self {
            execution_id: execution.id,
            flow_id: execution.flow_id,
            status: execution.status,
            progress: progress_percentage(completed, execution.planned_steps),
            duration_ms: execution.duration_ms,
            formatted_duration: format_duration(execution.duration_ms),
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            error_message: execution.error_message.clone(),
            steps: steps.iter().map(StepSummary::from).collect(),
            logs: execution.logs.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_step(&self) -> Option<&StepSummary> {
        self.steps.iter().find(|s| s.status == StepStatus::Running)
    }
}

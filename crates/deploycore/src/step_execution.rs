use crate::{Config, ExecutionId, LogEntry, LogLevel, Output, RecordError, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StepExecutionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one step's attempt within an execution.
///
/// Step id, type and name are copied from the flow definition when the
/// record is created, so later edits to the flow do not affect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub id: StepExecutionId,
    pub execution_id: ExecutionId,
    pub step_id: String,
    pub step_type: String,
    pub step_name: String,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub logs: Vec<LogEntry>,
    pub output: Output,
    pub error_message: Option<String>,
    pub metadata: Config,
}

impl StepExecutionRecord {
    pub fn new(execution_id: ExecutionId, step: &Step) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_id: step.id.clone(),
            step_type: step.step_type.clone(),
            step_name: step.name.clone(),
            status: StepStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: 0,
            logs: Vec::new(),
            output: Output::new(),
            error_message: None,
            metadata: Config::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), RecordError> {
        self.expect(&[StepStatus::Pending], StepStatus::Running)?;
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, output: Output) -> Result<(), RecordError> {
        self.expect(&[StepStatus::Running], StepStatus::Completed)?;
        self.finish(StepStatus::Completed);
        self.output = output;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), RecordError> {
        self.expect(&[StepStatus::Running], StepStatus::Failed)?;
        self.finish(StepStatus::Failed);
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Mark the step skipped. Duration is forced to 0.
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), RecordError> {
        self.expect(
            &[StepStatus::Pending, StepStatus::Running],
            StepStatus::Skipped,
        )?;
        self.status = StepStatus::Skipped;
        self.completed_at = Some(Utc::now());
        self.duration_ms = 0;
        self.error_message = Some(reason.into());
        Ok(())
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
    }

    pub fn is_running(&self) -> bool {
        self.status == StepStatus::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
    }

    fn expect(&self, allowed: &[StepStatus], to: StepStatus) -> Result<(), RecordError> {
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

use crate::{ExecutionId, FlowId, LogEntry, Output, StepLogger, TriggerType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events published over the lifetime of an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        flow_id: FlowId,
        trigger_type: TriggerType,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        execution_id: ExecutionId,
        step_id: String,
        step_type: String,
        step_name: String,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: ExecutionId,
        step_id: String,
        output: Output,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        execution_id: ExecutionId,
        step_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    StepSkipped {
        execution_id: ExecutionId,
        step_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    StepLog {
        execution_id: ExecutionId,
        step_id: String,
        entry: LogEntry,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        flow_id: FlowId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ExecutionFailed {
        execution_id: ExecutionId,
        flow_id: FlowId,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ExecutionCancelled {
        execution_id: ExecutionId,
        flow_id: FlowId,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Dotted event name used by external sinks
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => "execution.started",
            ExecutionEvent::StepStarted { .. } => "step.started",
            ExecutionEvent::StepCompleted { .. } => "step.completed",
            ExecutionEvent::StepFailed { .. } => "step.failed",
            ExecutionEvent::StepSkipped { .. } => "step.skipped",
            ExecutionEvent::StepLog { .. } => "step.log",
            ExecutionEvent::ExecutionCompleted { .. } => "execution.completed",
            ExecutionEvent::ExecutionFailed { .. } => "execution.failed",
            ExecutionEvent::ExecutionCancelled { .. } => "execution.cancelled",
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::StepStarted { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::StepSkipped { execution_id, .. }
            | ExecutionEvent::StepLog { execution_id, .. }
            | ExecutionEvent::ExecutionCompleted { execution_id, .. }
            | ExecutionEvent::ExecutionFailed { execution_id, .. }
            | ExecutionEvent::ExecutionCancelled { execution_id, .. } => *execution_id,
        }
    }

    /// True for the three events that end an execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ExecutionCompleted { .. }
                | ExecutionEvent::ExecutionFailed { .. }
                | ExecutionEvent::ExecutionCancelled { .. }
        )
    }
}

/// Fire-and-forget event bus. Publishing never fails the caller, even with
/// no subscribers attached.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        tracing::trace!(event = event.name(), execution_id = %event.execution_id(), "publishing event");
        let _ = self.sender.send(event);
    }

    pub fn create_logger(&self, execution_id: ExecutionId, step_id: impl Into<String>) -> StepLogger {
        StepLogger::new(execution_id, step_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

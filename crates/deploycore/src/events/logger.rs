use crate::{Config, ExecutionEvent, ExecutionId, LogEntry, LogLevel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Log sink handed to step executors.
///
/// Entries are buffered for the current step execution record and also
/// published as `step.log` events for live observers.
#[derive(Clone)]
pub struct StepLogger {
    execution_id: ExecutionId,
    step_id: String,
    entries: Arc<Mutex<Vec<LogEntry>>>,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl StepLogger {
    pub fn new(
        execution_id: ExecutionId,
        step_id: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            step_id: step_id.into(),
            entries: Arc::new(Mutex::new(Vec::new())),
            sender,
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.push(LogEntry::new(level, message));
    }

    pub fn log_with_context(&self, level: LogLevel, message: impl Into<String>, context: Config) {
        self.push(LogEntry::new(level, message).with_context(context));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Take every buffered entry, leaving the buffer empty.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.lock())
    }

    /// Copy of the buffered entries
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    fn push(&self, entry: LogEntry) {
        tracing::debug!(
            execution_id = %self.execution_id,
            step_id = %self.step_id,
            level = %entry.level,
            "{}",
            entry.message
        );
        self.lock().push(entry.clone());
        let _ = self.sender.send(ExecutionEvent::StepLog {
            execution_id: self.execution_id,
            step_id: self.step_id.clone(),
            entry,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

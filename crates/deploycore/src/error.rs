use crate::{ExecutionId, FlowId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Flow {0} has no steps")]
    EmptyFlow(FlowId),

    #[error("Duplicate step id in flow: {0}")]
    DuplicateStepId(String),

    #[error("Flow not found: {0}")]
    FlowNotFound(FlowId),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while resolving, validating or running a single step.
///
/// The display text of each variant is what ends up in the step record's
/// error field and, for the run-terminating failure, in the execution record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No executor found for step type: {0}")]
    UnknownStepType(String),

    #[error("Required output from '{0}' step not found")]
    MissingDependencyOutput(String),

    #[error("{0}")]
    ExecutorFailure(String),

    #[error("Cancelled")]
    CancellationRequested,
}

impl StepError {
    /// A step that cannot even start never qualifies for continue-on-failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StepError::InvalidConfiguration(_) | StepError::UnknownStepType(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },
}

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

//! Core abstractions for the deployment flow engine
//!
//! This crate provides the data model (flows, execution records and their
//! state machines), the step executor contract, errors, events and the
//! persistence boundary. It has no knowledge of how runs are scheduled.

mod config;
mod error;
pub mod events;
mod execution;
mod flow;
mod log;
mod step;
mod step_execution;
mod store;

pub use config::{Config, ConfigExt, ConfigSchema, FieldSpec, FieldType, Output};
pub use error::{FlowError, RecordError, StepError, StoreError};
pub use events::*;
pub use execution::{
    progress_percentage, ExecutionId, ExecutionRecord, ExecutionStatus, StepOutcome,
};
pub use flow::{
    FlowDefinition, FlowId, FlowStats, FlowStatus, FlowTemplate, RunOutcome, Step,
    TriggerContext, TriggerType,
};
pub use log::{format_duration, LogEntry, LogLevel};
pub use step::{StepContext, StepExecutor};
pub use step_execution::{StepExecutionId, StepExecutionRecord, StepStatus};
pub use store::{ExecutionStore, InMemoryStore};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

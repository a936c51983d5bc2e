//! Flow execution runtime
//!
//! This crate provides the engine that runs deployment flows step by step,
//! the step executor registry, and the runtime facade tying them to a store
//! and an event bus.

mod engine;
mod loader;
mod registry;
mod runtime;
mod summary;

pub use engine::{ExecutionHandle, FlowEngine, CANCELLED_BY_USER};
pub use loader::{load_flow, parse_flow, save_flow};
pub use registry::{StepExecutorFactory, StepRegistry, StepTypeMetadata};
pub use runtime::{DeployRuntime, RuntimeConfig};
pub use summary::{ExecutionSummary, StepSummary};

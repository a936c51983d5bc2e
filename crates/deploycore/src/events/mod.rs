// crates/deploycore/src/events/mod.rs

mod base;
mod logger;

pub use base::{EventBus, ExecutionEvent};
pub use logger::StepLogger;

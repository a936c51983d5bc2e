//! Built-in deployment steps
//!
//! Simulated bodies for the standard pipeline step types. Each one narrates
//! its work through the step logger and returns a fixed-shape output map.

mod build;
mod deploy;
mod monitor;
mod notify;
mod rollback;
mod scale;
mod simulation;
mod test_suite;
mod verify;

pub use build::BuildStep;
pub use deploy::DeployStep;
pub use monitor::MonitorStep;
pub use notify::{NotifyStep, SUPPORTED_CHANNELS};
pub use rollback::RollbackStep;
pub use scale::ScaleStep;
pub use simulation::SimulationOptions;
pub use test_suite::TestStep;
pub use verify::VerifyStep;

use deployruntime::StepRegistry;
use std::sync::Arc;

/// Step types registered by [`register_all`]
pub const BUILTIN_STEP_TYPES: &[&str] = &[
    "build", "test", "deploy", "verify", "monitor", "notify", "rollback", "scale",
];

/// Register all built-in steps with a registry
pub fn register_all(registry: &mut StepRegistry) {
    register_all_with(registry, SimulationOptions::default());
}

/// Register all built-in steps, sharing one set of simulation options
pub fn register_all_with(registry: &mut StepRegistry, options: SimulationOptions) {
    registry.register_executor("build", Arc::new(BuildStep::new(options)));
    registry.register_executor("test", Arc::new(TestStep::new(options)));
    registry.register_executor("deploy", Arc::new(DeployStep::new(options)));
    registry.register_executor("verify", Arc::new(VerifyStep::new(options)));
    registry.register_executor("monitor", Arc::new(MonitorStep::new(options)));
    registry.register_executor("notify", Arc::new(NotifyStep::new(options)));
    registry.register_executor("rollback", Arc::new(RollbackStep::new(options)));
    registry.register_executor("scale", Arc::new(ScaleStep::new(options)));
}

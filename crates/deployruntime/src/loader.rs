use deploycore::{FlowDefinition, FlowError};
use std::path::Path;

/// Read a JSON flow definition from disk.
///
/// Omitted fields take their defaults: steps are enabled, the flow is
/// active and its statistics start at zero.
pub fn load_flow(path: impl AsRef<Path>) -> Result<FlowDefinition, FlowError> {
    let path = path.as_ref();
    tracing::debug!("Loading flow from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_flow(&content)
}

pub fn parse_flow(content: &str) -> Result<FlowDefinition, FlowError> {
    let flow: FlowDefinition = serde_json::from_str(content)?;
    Ok(flow)
}

/// Write a flow definition as pretty-printed JSON
pub fn save_flow(flow: &FlowDefinition, path: impl AsRef<Path>) -> Result<(), FlowError> {
    let content = serde_json::to_string_pretty(flow)?;
    std::fs::write(path, content)?;
    Ok(())
}

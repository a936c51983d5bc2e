use crate::{
    ExecutionId, ExecutionRecord, FlowDefinition, FlowId, FlowStats, RunOutcome,
    StepExecutionRecord, StoreError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence boundary used by the engine.
///
/// Every call is assumed durable once it returns. `record_run` must apply
/// its read-modify-write atomically per flow.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save_flow(&self, flow: &FlowDefinition) -> Result<(), StoreError>;

    async fn get_flow(&self, id: FlowId) -> Result<Option<FlowDefinition>, StoreError>;

    /// Fold one finished run into the flow's aggregate statistics. Flows the
    /// store has not seen yet are inserted first.
    async fn record_run(
        &self,
        flow: &FlowDefinition,
        outcome: RunOutcome,
        duration_ms: u64,
    ) -> Result<FlowStats, StoreError>;

    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Executions of a flow, oldest first
    async fn executions_for_flow(&self, flow_id: FlowId) -> Result<Vec<ExecutionRecord>, StoreError>;

    async fn save_step_execution(&self, record: &StepExecutionRecord) -> Result<(), StoreError>;

    /// Step records of an execution in creation order
    async fn step_executions(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<StepExecutionRecord>, StoreError>;
}

/// Process-local store, good for tests and the CLI
#[derive(Default)]
pub struct InMemoryStore {
    flows: RwLock<HashMap<FlowId, FlowDefinition>>,
    executions: RwLock<HashMap<ExecutionId, ExecutionRecord>>,
    step_executions: RwLock<HashMap<ExecutionId, Vec<StepExecutionRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn save_flow(&self, flow: &FlowDefinition) -> Result<(), StoreError> {
        let mut flows = self.flows.write().await;
        flows.insert(flow.id, flow.clone());
        Ok(())
    }

    async fn get_flow(&self, id: FlowId) -> Result<Option<FlowDefinition>, StoreError> {
        let flows = self.flows.read().await;
        Ok(flows.get(&id).cloned())
    }

    async fn record_run(
        &self,
        flow: &FlowDefinition,
        outcome: RunOutcome,
        duration_ms: u64,
    ) -> Result<FlowStats, StoreError> {
        // Write lock spans the whole read-modify-write.
        let mut flows = self.flows.write().await;
        let stored = flows.entry(flow.id).or_insert_with(|| flow.clone());
        stored.stats.record(outcome, duration_ms, Utc::now());
        Ok(stored.stats.clone())
    }

    async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut executions = self.executions.write().await;
        executions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>, StoreError> {
        let executions = self.executions.read().await;
        Ok(executions.get(&id).cloned())
    }

    async fn executions_for_flow(&self, flow_id: FlowId) -> Result<Vec<ExecutionRecord>, StoreError> {
        let executions = self.executions.read().await;
        let mut matching: Vec<ExecutionRecord> = executions
            .values()
            .filter(|e| e.flow_id == flow_id)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.created_at);
        Ok(matching)
    }

    async fn save_step_execution(&self, record: &StepExecutionRecord) -> Result<(), StoreError> {
        let mut steps = self.step_executions.write().await;
        let records = steps.entry(record.execution_id).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn step_executions(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<StepExecutionRecord>, StoreError> {
        let steps = self.step_executions.read().await;
        Ok(steps.get(&execution_id).cloned().unwrap_or_default())
    }
}

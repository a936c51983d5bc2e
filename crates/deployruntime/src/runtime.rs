use crate::engine::{ExecutionHandle, FlowEngine};
use crate::registry::StepRegistry;
use crate::summary::ExecutionSummary;
use deploycore::{
    EventBus, ExecutionEvent, ExecutionId, ExecutionRecord, ExecutionStore, FlowDefinition,
    FlowError, FlowId, FlowStatus, InMemoryStore, TriggerContext,
};
use std::sync::Arc;

/// Main entry point: owns the registry, the store and the engine
pub struct DeployRuntime {
    registry: Arc<StepRegistry>,
    engine: Arc<FlowEngine>,
    event_bus: Arc<EventBus>,
    store: Arc<dyn ExecutionStore>,
}

impl DeployRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(StepRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<StepRegistry>, config: RuntimeConfig) -> Self {
        Self::with_store(registry, Arc::new(InMemoryStore::new()), config)
    }

    /// Create a new runtime backed by a custom store
    pub fn with_store(
        registry: Arc<StepRegistry>,
        store: Arc<dyn ExecutionStore>,
        config: RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let engine = Arc::new(FlowEngine::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&event_bus),
        ));

        Self {
            registry,
            engine,
            event_bus,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<FlowEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Validate and store a flow definition
    pub async fn register_flow(&self, flow: FlowDefinition) -> Result<FlowId, FlowError> {
        flow.validate()?;
        let id = flow.id;
        self.store.save_flow(&flow).await?;
        tracing::info!("Registered flow '{}' ({})", flow.name, id);
        Ok(id)
    }

    pub async fn flow(&self, flow_id: FlowId) -> Result<FlowDefinition, FlowError> {
        self.store
            .get_flow(flow_id)
            .await?
            .ok_or(FlowError::FlowNotFound(flow_id))
    }

    /// Status label derived from the flow's latest execution
    pub async fn flow_status(&self, flow_id: FlowId) -> Result<FlowStatus, FlowError> {
        let flow = self.flow(flow_id).await?;
        let latest = self
            .store
            .executions_for_flow(flow_id)
            .await?
            .last()
            .map(|e| e.status);
        Ok(flow.status(latest))
    }

    /// Execute a registered flow by id
    pub async fn run_flow(
        &self,
        flow_id: FlowId,
        trigger: TriggerContext,
    ) -> Result<ExecutionRecord, FlowError> {
        let flow = self.flow(flow_id).await?;
        self.engine.execute(&flow, trigger).await
    }

    /// Start a registered flow in the background
    pub async fn spawn_flow(
        &self,
        flow_id: FlowId,
        trigger: TriggerContext,
    ) -> Result<ExecutionHandle, FlowError> {
        let flow = self.flow(flow_id).await?;
        self.engine.spawn(flow, trigger).await
    }

    /// Execute a flow directly (without registration)
    pub async fn execute(
        &self,
        flow: &FlowDefinition,
        trigger: TriggerContext,
    ) -> Result<ExecutionRecord, FlowError> {
        self.engine.execute(flow, trigger).await
    }

    pub async fn cancel(&self, execution_id: ExecutionId) -> bool {
        self.engine.cancel(execution_id).await
    }

    pub async fn status(&self, execution_id: ExecutionId) -> Result<ExecutionSummary, FlowError> {
        self.engine.status(execution_id).await
    }

    pub async fn executions_for_flow(
        &self,
        flow_id: FlowId,
    ) -> Result<Vec<ExecutionRecord>, FlowError> {
        Ok(self.store.executions_for_flow(flow_id).await?)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for DeployRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}

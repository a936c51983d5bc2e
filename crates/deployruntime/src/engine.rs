use crate::registry::StepRegistry;
use crate::summary::ExecutionSummary;
use chrono::Utc;
use deploycore::{
    Config, EventBus, ExecutionEvent, ExecutionId, ExecutionRecord, ExecutionStore,
    FlowDefinition, FlowError, LogLevel, Output, RunOutcome, StepContext, StepError,
    StepExecutionRecord, StepLogger, TriggerContext,
};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Reason stored on steps that were running when their execution was cancelled
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

/// Mutable state of one live execution.
///
/// Owned by the worker driving the run; `cancel` is the only other writer
/// and coordinates through `cancel_requested`.
struct RunState {
    execution: ExecutionRecord,
    steps: Vec<StepExecutionRecord>,
    current: Option<StepLogger>,
    cancel_requested: bool,
}

struct ActiveRun {
    execution_id: ExecutionId,
    flow: Arc<FlowDefinition>,
    trigger: TriggerContext,
    state: Mutex<RunState>,
    token: CancellationToken,
    /// Flipped to `true` once `cancel` has finished marking the records
    finalized: watch::Sender<bool>,
}

impl ActiveRun {
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum StepsOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Runs flow definitions step by step and records every attempt.
///
/// One engine can drive many executions concurrently; per-run state never
/// lives on the engine itself, only in the map of active runs.
pub struct FlowEngine {
    registry: Arc<StepRegistry>,
    store: Arc<dyn ExecutionStore>,
    event_bus: Arc<EventBus>,
    active: RwLock<HashMap<ExecutionId, Arc<ActiveRun>>>,
}

impl FlowEngine {
    pub fn new(
        registry: Arc<StepRegistry>,
        store: Arc<dyn ExecutionStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            event_bus,
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Run a flow to a terminal state and return its execution record.
    ///
    /// A failed run is still `Ok`; `Err` means no run could be created.
    pub async fn execute(
        &self,
        flow: &FlowDefinition,
        trigger: TriggerContext,
    ) -> Result<ExecutionRecord, FlowError> {
        let run = self.prepare(Arc::new(flow.clone()), trigger).await?;
        self.drive(run).await
    }

    /// Start a run on a background task and return a handle to it.
    ///
    /// The execution record exists and is `running` by the time this returns.
    pub async fn spawn(
        self: &Arc<Self>,
        flow: FlowDefinition,
        trigger: TriggerContext,
    ) -> Result<ExecutionHandle, FlowError> {
        let run = self.prepare(Arc::new(flow), trigger).await?;
        let execution_id = run.execution_id;

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.drive(run).await });

        Ok(ExecutionHandle {
            execution_id,
            engine: Arc::clone(self),
            task,
        })
    }

    /// Request cancellation of a running execution.
    ///
    /// Returns `false` without touching anything when the execution is
    /// unknown or not running. Executor-side cancel failures are logged.
    pub async fn cancel(&self, execution_id: ExecutionId) -> bool {
        let run = match self.active.read().await.get(&execution_id) {
            Some(run) => Arc::clone(run),
            None => {
                tracing::debug!("Execution {} is not active, nothing to cancel", execution_id);
                return false;
            }
        };

        let running: Vec<(StepExecutionRecord, Option<StepLogger>)> = {
            let mut state = run.lock();
            if !state.execution.is_running() || state.cancel_requested {
                return false;
            }
            state.cancel_requested = true;

            let current = state.current.clone();
            state
                .steps
                .iter()
                .filter(|s| s.is_running())
                .map(|s| {
                    let logger = current
                        .as_ref()
                        .filter(|l| l.step_id() == s.step_id)
                        .cloned();
                    (s.clone(), logger)
                })
                .collect()
        };

        tracing::info!("Cancelling execution {}", execution_id);
        run.token.cancel();

        let mut cancelled = Vec::with_capacity(running.len());
        for (record, logger) in running {
            let logger = logger.unwrap_or_else(|| {
                self.event_bus
                    .create_logger(execution_id, record.step_id.clone())
            });

            match self.registry.resolve(&record.step_type) {
                Ok(executor) => {
                    if let Err(e) = executor.cancel(&record, &logger).await {
                        tracing::warn!(
                            step_execution_id = %record.id,
                            "Failed to cancel step execution: {}",
                            e
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        step_execution_id = %record.id,
                        "Failed to cancel step execution: {}",
                        e
                    );
                }
            }
            cancelled.push((record.id, logger));
        }

        let (skipped, snapshot) = {
            let mut guard = run.lock();
            let state = &mut *guard;

            let mut skipped = Vec::with_capacity(cancelled.len());
            for (id, logger) in &cancelled {
                let Some(record) = state.steps.iter_mut().find(|s| s.id == *id) else {
                    continue;
                };
                record.logs.extend(logger.drain());
                match record.skip(CANCELLED_BY_USER) {
                    Ok(()) => skipped.push(record.clone()),
                    Err(e) => tracing::warn!("Could not skip step {}: {}", record.step_id, e),
                }
            }

            state.current = None;
            state
                .execution
                .add_log(LogLevel::Warning, "Execution cancelled by user");
            if let Err(e) = state.execution.cancel() {
                tracing::warn!("Could not cancel execution {}: {}", execution_id, e);
            }
            state.execution.rebuild_outcomes(&state.steps);
            (skipped, state.execution.clone())
        };

        for record in &skipped {
            self.persist_step(record).await;
            self.event_bus.emit(ExecutionEvent::StepSkipped {
                execution_id,
                step_id: record.step_id.clone(),
                reason: CANCELLED_BY_USER.to_string(),
                timestamp: Utc::now(),
            });
        }
        self.persist_execution(&snapshot).await;

        self.event_bus.emit(ExecutionEvent::ExecutionCancelled {
            execution_id,
            flow_id: snapshot.flow_id,
            timestamp: Utc::now(),
        });

        run.finalized.send_replace(true);
        true
    }

    /// Read-only projection of an execution's progress
    pub async fn status(&self, execution_id: ExecutionId) -> Result<ExecutionSummary, FlowError> {
        let active = self.active.read().await.get(&execution_id).cloned();
        if let Some(run) = active {
            let state = run.lock();
            return Ok(ExecutionSummary::new(&state.execution, &state.steps));
        }

        let execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or(FlowError::ExecutionNotFound(execution_id))?;
        let steps = self.store.step_executions(execution_id).await?;
        Ok(ExecutionSummary::new(&execution, &steps))
    }

    /// Ids of executions currently being driven by this engine
    pub async fn running_executions(&self) -> Vec<ExecutionId> {
        self.active.read().await.keys().copied().collect()
    }

    async fn prepare(
        &self,
        flow: Arc<FlowDefinition>,
        trigger: TriggerContext,
    ) -> Result<Arc<ActiveRun>, FlowError> {
        flow.validate()?;

        let planned = flow.enabled_steps().len();
        let mut execution = ExecutionRecord::new(ExecutionId::new_v4(), flow.id, &trigger, planned);
        self.persist_execution(&execution).await;

        execution.start()?;
        execution.add_log(
            LogLevel::Info,
            format!("Execution started ({} trigger)", trigger.trigger_type),
        );
        self.persist_execution(&execution).await;

        let execution_id = execution.id;
        tracing::info!(
            "Starting execution {} of flow '{}' ({} enabled steps)",
            execution_id,
            flow.name,
            planned
        );

        let (finalized, _) = watch::channel(false);
        let run = Arc::new(ActiveRun {
            execution_id,
            flow: Arc::clone(&flow),
            trigger: trigger.clone(),
            state: Mutex::new(RunState {
                execution,
                steps: Vec::new(),
                current: None,
                cancel_requested: false,
            }),
            token: CancellationToken::new(),
            finalized,
        });

        self.active
            .write()
            .await
            .insert(execution_id, Arc::clone(&run));

        self.event_bus.emit(ExecutionEvent::ExecutionStarted {
            execution_id,
            flow_id: flow.id,
            trigger_type: trigger.trigger_type,
            timestamp: Utc::now(),
        });

        Ok(run)
    }

    async fn drive(&self, run: Arc<ActiveRun>) -> Result<ExecutionRecord, FlowError> {
        let outcome = self.run_steps(&run).await;
        let result = self.finalize(&run, outcome).await;
        self.active.write().await.remove(&run.execution_id);
        result
    }

    async fn run_steps(&self, run: &ActiveRun) -> StepsOutcome {
        let execution_id = run.execution_id;
        let flow = Arc::clone(&run.flow);
        let mut outputs: HashMap<String, Output> = HashMap::new();

        for step in flow.enabled_steps() {
            let executor = match self.registry.resolve(&step.step_type) {
                Ok(executor) => executor,
                Err(err) => {
                    let message = err.to_string();
                    tracing::error!("Step '{}' failed: {}", step.name, message);
                    let snapshot = {
                        let mut state = run.lock();
                        if state.cancel_requested {
                            return StepsOutcome::Cancelled;
                        }
                        state.execution.add_log(
                            LogLevel::Error,
                            format!("Step '{}' failed: {}", step.name, message),
                        );
                        state.execution.clone()
                    };
                    self.persist_execution(&snapshot).await;
                    return StepsOutcome::Failed(message);
                }
            };

            let logger = self.event_bus.create_logger(execution_id, step.id.clone());
            let (started, snapshot) = {
                let mut state = run.lock();
                if state.cancel_requested {
                    return StepsOutcome::Cancelled;
                }

                let mut record = StepExecutionRecord::new(execution_id, step);
                if let Err(e) = record.start() {
                    return StepsOutcome::Failed(e.to_string());
                }
                state
                    .execution
                    .add_log(LogLevel::Info, format!("Starting step: {}", step.name));
                state.steps.push(record.clone());
                state.current = Some(logger.clone());
                (record, state.execution.clone())
            };
            self.persist_step(&started).await;
            self.persist_execution(&snapshot).await;

            tracing::info!("Starting step '{}' ({})", step.name, step.step_type);
            self.event_bus.emit(ExecutionEvent::StepStarted {
                execution_id,
                step_id: step.id.clone(),
                step_type: step.step_type.clone(),
                step_name: step.name.clone(),
                timestamp: Utc::now(),
            });

            let result = if executor.validate(&step.config) {
                let ctx = StepContext {
                    execution_id,
                    step: step.clone(),
                    config: step.config.clone(),
                    flow: Arc::clone(&flow),
                    trigger: run.trigger.clone(),
                    previous_outputs: outputs.clone(),
                    log: logger.clone(),
                    cancellation: run.token.clone(),
                };

                let executor = Arc::clone(&executor);
                let task = tokio::spawn(async move { executor.execute(ctx).await });
                join_step(task, &run.token).await
            } else {
                let missing = executor.config_schema().missing_required(&step.config);
                Err(StepError::InvalidConfiguration(format!(
                    "missing required field(s): {}",
                    missing.join(", ")
                )))
            };

            let (finished, snapshot, critical_failure) = {
                let mut guard = run.lock();
                let state = &mut *guard;
                // cancel() owns the running step record from here on
                if state.cancel_requested {
                    return StepsOutcome::Cancelled;
                }
                state.current = None;

                let Some(record) = state.steps.last_mut() else {
                    return StepsOutcome::Failed(format!("Step record for '{}' vanished", step.id));
                };
                record.logs.extend(logger.drain());

                let mut critical_failure = None;
                match &result {
                    Ok(output) => {
                        if let Err(e) = record.complete(output.clone()) {
                            tracing::warn!("Could not complete step {}: {}", step.id, e);
                        }
                        state.execution.add_log_with_context(
                            LogLevel::Info,
                            format!("Completed step: {}", step.name),
                            log_context(json!({
                                "step_id": step.id,
                                "duration_ms": record.duration_ms,
                            })),
                        );
                    }
                    Err(err) => {
                        let message = err.to_string();
                        if let Err(e) = record.fail(message.clone()) {
                            tracing::warn!("Could not fail step {}: {}", step.id, e);
                        }
                        state.execution.add_log_with_context(
                            LogLevel::Error,
                            format!("Step '{}' failed: {}", step.name, message),
                            log_context(json!({ "step_id": step.id, "error": message })),
                        );

                        if err.is_fatal() || step.is_critical() {
                            critical_failure = Some(message);
                        } else {
                            state.execution.add_log(
                                LogLevel::Warning,
                                format!("Step '{}' is not critical, continuing", step.name),
                            );
                        }
                    }
                }

                let record = record.clone();
                state.execution.rebuild_outcomes(&state.steps);
                (record, state.execution.clone(), critical_failure)
            };
            self.persist_step(&finished).await;
            self.persist_execution(&snapshot).await;

            match result {
                Ok(output) => {
                    tracing::info!(
                        "Step '{}' completed in {}ms",
                        step.name,
                        finished.duration_ms
                    );
                    self.event_bus.emit(ExecutionEvent::StepCompleted {
                        execution_id,
                        step_id: step.id.clone(),
                        output: output.clone(),
                        duration_ms: finished.duration_ms,
                        timestamp: Utc::now(),
                    });
                    outputs.insert(step.id.clone(), output);
                }
                Err(err) => {
                    tracing::error!("Step '{}' failed: {}", step.name, err);
                    self.event_bus.emit(ExecutionEvent::StepFailed {
                        execution_id,
                        step_id: step.id.clone(),
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }

            if let Some(message) = critical_failure {
                return StepsOutcome::Failed(message);
            }
        }

        StepsOutcome::Completed
    }

    async fn finalize(
        &self,
        run: &ActiveRun,
        outcome: StepsOutcome,
    ) -> Result<ExecutionRecord, FlowError> {
        let execution_id = run.execution_id;

        let transition = {
            let mut state = run.lock();
            if state.cancel_requested {
                None
            } else {
                match outcome {
                    StepsOutcome::Completed => Some(
                        state
                            .execution
                            .complete()
                            .map(|_| RunOutcome::Success),
                    ),
                    StepsOutcome::Failed(message) => Some(
                        state
                            .execution
                            .fail(message)
                            .map(|_| RunOutcome::Failure),
                    ),
                    StepsOutcome::Cancelled => None,
                }
            }
        };

        let Some(transition) = transition else {
            // cancel() marks the records; wait until it is done
            let mut finalized = run.finalized.subscribe();
            let _ = finalized.wait_for(|done| *done).await;

            // The worker may have saved a running snapshot after cancel() wrote
            // its records, so the in-memory state is written back last.
            let (execution, steps) = {
                let state = run.lock();
                (state.execution.clone(), state.steps.clone())
            };
            for step in &steps {
                self.persist_step(step).await;
            }
            self.persist_execution(&execution).await;

            tracing::info!("Execution {} cancelled", execution_id);
            return Ok(execution);
        };

        let outcome = transition?;
        let record = run.lock().execution.clone();
        self.persist_execution(&record).await;

        match self
            .store
            .record_run(&run.flow, outcome, record.duration_ms)
            .await
        {
            Ok(stats) => tracing::debug!(
                "Flow {} stats: {} runs, {:.2}% success",
                run.flow.id,
                stats.total_runs,
                stats.success_rate
            ),
            Err(e) => tracing::warn!("Failed to update stats for flow {}: {}", run.flow.id, e),
        }

        match outcome {
            RunOutcome::Success => {
                tracing::info!(
                    "Execution {} completed successfully in {}ms",
                    execution_id,
                    record.duration_ms
                );
                self.event_bus.emit(ExecutionEvent::ExecutionCompleted {
                    execution_id,
                    flow_id: record.flow_id,
                    duration_ms: record.duration_ms,
                    timestamp: Utc::now(),
                });
            }
            RunOutcome::Failure => {
                let error = record.error_message.clone().unwrap_or_default();
                tracing::error!(
                    flow_id = %record.flow_id,
                    execution_id = %execution_id,
                    "Execution failed: {}",
                    error
                );
                self.event_bus.emit(ExecutionEvent::ExecutionFailed {
                    execution_id,
                    flow_id: record.flow_id,
                    error,
                    duration_ms: record.duration_ms,
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(record)
    }

    async fn persist_execution(&self, record: &ExecutionRecord) {
        if let Err(e) = self.store.save_execution(record).await {
            tracing::warn!(execution_id = %record.id, "Failed to persist execution: {}", e);
        }
    }

    async fn persist_step(&self, record: &StepExecutionRecord) {
        if let Err(e) = self.store.save_step_execution(record).await {
            tracing::warn!(step_execution_id = %record.id, "Failed to persist step execution: {}", e);
        }
    }
}

/// Await a step body running on its own task.
///
/// Cancellation aborts the task; a panic becomes an `ExecutorFailure` so the
/// step still reaches a terminal state.
async fn join_step(
    mut task: JoinHandle<Result<Output, StepError>>,
    token: &CancellationToken,
) -> Result<Output, StepError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            task.abort();
            Err(StepError::CancellationRequested)
        }
        joined = &mut task => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(StepError::ExecutorFailure(format!(
                "Step executor panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(_) => Err(StepError::CancellationRequested),
        },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
    }
}

fn log_context(value: Value) -> Config {
    match value {
        Value::Object(map) => map,
        _ => Config::new(),
    }
}

/// Handle for monitoring and cancelling a spawned execution
pub struct ExecutionHandle {
    execution_id: ExecutionId,
    engine: Arc<FlowEngine>,
    task: JoinHandle<Result<ExecutionRecord, FlowError>>,
}

impl ExecutionHandle {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub async fn cancel(&self) -> bool {
        self.engine.cancel(self.execution_id).await
    }

    pub async fn status(&self) -> Result<ExecutionSummary, FlowError> {
        self.engine.status(self.execution_id).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the execution to reach a terminal state
    pub async fn wait(self) -> Result<ExecutionRecord, FlowError> {
        self.task
            .await
            .map_err(|e| FlowError::Execution(format!("Task join error: {}", e)))?
    }
}

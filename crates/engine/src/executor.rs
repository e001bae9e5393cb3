//! The executor: the public engine API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use conflux_core::{EngineError, JsonMap, value};
use conflux_execution::{Execution, ExecutionStatus, TriggerType};
use conflux_handler::{
    Credentials, ExecutionContext, ExecutionStore, HandlerRegistry, Settings, SubExecutor,
    WorkflowStore, keys,
};
use conflux_log::{ConsoleSink, ExecutionLogger, LogLevel, LogSink, SinkSet};
use conflux_storage::{MemoryCredentialStore, MemoryExecutionStore, MemorySettings,
    MemoryWorkflowStore};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::traversal;

struct Inner {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    credentials: Arc<dyn Credentials>,
    settings: Arc<dyn Settings>,
    registry: Arc<HandlerRegistry>,
    sinks: Arc<SinkSet>,
    running: DashMap<String, CancellationToken>,
}

/// Loads workflows, drives their traversal, and seals execution records.
///
/// Cheap to clone; all state is shared. One executor serves any number of
/// concurrent executions — their contexts are isolated, and only the
/// rate-limit buckets (process-wide by design) and the stores are shared.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

/// Configures an [`Executor`]. Every component defaults to the in-memory
/// implementation; hosts override the stores they persist.
pub struct ExecutorBuilder {
    workflows: Option<Arc<dyn WorkflowStore>>,
    executions: Option<Arc<dyn ExecutionStore>>,
    credentials: Option<Arc<dyn Credentials>>,
    settings: Option<Arc<dyn Settings>>,
    registry: Option<HandlerRegistry>,
    sinks: Vec<Arc<dyn LogSink>>,
    console: bool,
}

impl ExecutorBuilder {
    /// Use this workflow store.
    #[must_use]
    pub fn workflows(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.workflows = Some(store);
        self
    }

    /// Use this execution store.
    #[must_use]
    pub fn executions(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.executions = Some(store);
        self
    }

    /// Use this credential store.
    #[must_use]
    pub fn credentials(mut self, store: Arc<dyn Credentials>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Use this settings store.
    #[must_use]
    pub fn settings(mut self, store: Arc<dyn Settings>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Use this handler registry instead of the built-in set.
    #[must_use]
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register an extra log sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Disable the default console sink.
    #[must_use]
    pub fn without_console_sink(mut self) -> Self {
        self.console = false;
        self
    }

    /// Assemble the executor.
    #[must_use]
    pub fn build(self) -> Executor {
        let settings: Arc<dyn Settings> = self
            .settings
            .unwrap_or_else(|| Arc::new(MemorySettings::new()));

        let sinks = Arc::new(SinkSet::new());
        if self.console {
            let level = LogLevel::parse(&settings.get_str(keys::EXECUTION_LOG_LEVEL, "info"))
                .unwrap_or(LogLevel::Info);
            sinks.add(Arc::new(ConsoleSink::new(level)));
        }
        for sink in self.sinks {
            sinks.add(sink);
        }

        Executor {
            inner: Arc::new(Inner {
                workflows: self
                    .workflows
                    .unwrap_or_else(|| Arc::new(MemoryWorkflowStore::new())),
                executions: self
                    .executions
                    .unwrap_or_else(|| Arc::new(MemoryExecutionStore::new())),
                credentials: self
                    .credentials
                    .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new())),
                settings,
                registry: Arc::new(self.registry.unwrap_or_else(crate::default_registry)),
                sinks,
                running: DashMap::new(),
            }),
        }
    }
}

/// A running asynchronous execution.
pub struct ExecutionHandle {
    execution_id: String,
    token: CancellationToken,
    join: JoinHandle<Result<Execution, EngineError>>,
}

impl ExecutionHandle {
    /// The execution's id, available immediately.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the terminal execution record.
    pub async fn await_result(self) -> Result<Execution, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::handler(format!("execution task aborted: {e}")))?
    }
}

/// A prepared run: row created, context built, token registered.
struct Prepared {
    ctx: ExecutionContext,
}

impl Executor {
    /// Start configuring an executor.
    #[must_use]
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder {
            workflows: None,
            executions: None,
            credentials: None,
            settings: None,
            registry: None,
            sinks: Vec::new(),
            console: true,
        }
    }

    /// Execute a workflow to completion with a manual trigger.
    pub async fn execute(
        &self,
        workflow_id: &str,
        input: JsonMap,
    ) -> Result<Execution, EngineError> {
        self.execute_with_trigger(workflow_id, input, TriggerType::Manual)
            .await
    }

    /// Execute a workflow to completion, recording the given trigger type.
    pub async fn execute_with_trigger(
        &self,
        workflow_id: &str,
        input: JsonMap,
        trigger: TriggerType,
    ) -> Result<Execution, EngineError> {
        let prepared = self.prepare(workflow_id, input, trigger, None).await?;
        self.drive(prepared).await
    }

    /// Start a workflow without waiting; the handle yields the terminal
    /// record and supports cancellation.
    pub async fn execute_async(
        &self,
        workflow_id: &str,
        input: JsonMap,
    ) -> Result<ExecutionHandle, EngineError> {
        let prepared = self.prepare(workflow_id, input, TriggerType::Manual, None).await?;
        let execution_id = prepared.ctx.execution_id.clone();
        let token = prepared.ctx.cancellation.clone();
        let engine = self.clone();
        let join = tokio::spawn(async move { engine.drive(prepared).await });
        Ok(ExecutionHandle {
            execution_id,
            token,
            join,
        })
    }

    /// Cancel a running execution. Returns `false` when the id is unknown
    /// or the run already terminated.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.inner.running.get(execution_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// All executions recorded for a workflow.
    pub async fn find_by_workflow_id(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Execution>, EngineError> {
        self.inner.executions.find_by_workflow_id(workflow_id).await
    }

    /// One execution by id.
    pub async fn find_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<Execution>, EngineError> {
        self.inner.executions.find_by_id(execution_id).await
    }

    /// The sink set, for registering sinks after construction.
    #[must_use]
    pub fn sinks(&self) -> &Arc<SinkSet> {
        &self.inner.sinks
    }

    /// Load, validate, create the running row, and build the context.
    async fn prepare(
        &self,
        workflow_id: &str,
        input: JsonMap,
        trigger: TriggerType,
        parent: Option<&ExecutionContext>,
    ) -> Result<Prepared, EngineError> {
        let workflow = self
            .inner
            .workflows
            .find_by_id(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        conflux_workflow::validate(&workflow)?;

        let execution_id = self
            .inner
            .executions
            .create_running(workflow_id, trigger, Utc::now(), input.clone())
            .await?;

        let logger = ExecutionLogger::new(&execution_id, self.inner.sinks.clone());
        let mut ctx = ExecutionContext::new(
            &execution_id,
            Arc::new(workflow),
            trigger,
            input,
            self.inner.credentials.clone(),
            self.inner.settings.clone(),
            logger,
            self.inner.registry.clone(),
        )
        .with_sub_executor(Arc::new(self.clone()));

        if let Some(parent) = parent {
            let mut ancestors = parent.ancestors().to_vec();
            ancestors.push(ctx.workflow.id.clone());
            ctx = ctx
                .with_cancellation(parent.cancellation.child_token())
                .with_ancestors(ancestors);
        }

        self.inner
            .running
            .insert(execution_id, ctx.cancellation.clone());
        Ok(Prepared { ctx })
    }

    /// Walk the graph, seal the record, and return it.
    async fn drive(&self, prepared: Prepared) -> Result<Execution, EngineError> {
        let ctx = prepared.ctx;
        let execution_id = ctx.execution_id.clone();
        let started = std::time::Instant::now();

        ctx.logger
            .execution_start(&ctx.workflow.id, &ctx.trigger_type.to_string());

        let timeout_secs = value::f64_or(
            &ctx.workflow.settings,
            "timeout",
            self.inner
                .settings
                .get_f64(keys::EXECUTION_TIMEOUT_SECONDS, 300.0),
        )
        .max(0.001);

        let walked = tokio::time::timeout(
            Duration::from_secs_f64(timeout_secs),
            traversal::run(&ctx, &self.inner.executions),
        )
        .await;

        let (status, output, error_message) = match walked {
            Err(_) => {
                // Expiry dropped the traversal and its in-flight tasks;
                // cancel the token so nested work stops too.
                ctx.cancellation.cancel();
                (
                    ExecutionStatus::Failed,
                    JsonMap::new(),
                    Some(
                        EngineError::timeout("execution", (timeout_secs * 1000.0) as u64)
                            .to_string(),
                    ),
                )
            }
            Ok(Err(setup_err)) => (
                ExecutionStatus::Failed,
                JsonMap::new(),
                Some(setup_err.to_string()),
            ),
            Ok(Ok(outcome)) => {
                if outcome.cancelled {
                    (ExecutionStatus::Cancelled, outcome.output, None)
                } else if let Some(err) = outcome.first_error {
                    (ExecutionStatus::Failed, outcome.output, Some(err.to_string()))
                } else {
                    (ExecutionStatus::Success, outcome.output, None)
                }
            }
        };

        let finished_at = Utc::now();
        self.inner
            .executions
            .finalize(&execution_id, status, finished_at, output, error_message)
            .await?;
        self.inner.running.remove(&execution_id);

        ctx.logger
            .execution_end(&status.to_string(), started.elapsed().as_millis() as u64);
        tracing::info!(
            execution_id = %execution_id,
            workflow_id = %ctx.workflow.id,
            status = %status,
            "execution finished"
        );

        self.inner
            .executions
            .find_by_id(&execution_id)
            .await?
            .ok_or_else(|| EngineError::Store(format!("execution {execution_id} vanished")))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("handlers", &self.inner.registry.len())
            .field("running", &self.inner.running.len())
            .finish()
    }
}

#[async_trait]
impl SubExecutor for Executor {
    async fn resolve_workflow(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Option<(String, String)>, EngineError> {
        if let Some(id) = id {
            if let Some(workflow) = self.inner.workflows.find_by_id(id).await? {
                return Ok(Some((workflow.id, workflow.name)));
            }
        }
        if let Some(name) = name {
            if let Some(workflow) = self.inner.workflows.find_by_name(name).await? {
                return Ok(Some((workflow.id, workflow.name)));
            }
        }
        Ok(None)
    }

    async fn execute_child(
        &self,
        workflow_id: &str,
        input: JsonMap,
        parent: &ExecutionContext,
    ) -> Result<Execution, EngineError> {
        // The subworkflow handler checks before calling; this guard keeps
        // the port itself safe for other callers.
        if parent.is_ancestor(workflow_id) {
            return Err(EngineError::Recursion {
                workflow_id: workflow_id.to_string(),
            });
        }
        let prepared = self
            .prepare(workflow_id, input, TriggerType::Subworkflow, Some(parent))
            .await?;
        self.drive(prepared).await
    }

    async fn spawn_child(
        &self,
        workflow_id: &str,
        input: JsonMap,
        parent: &ExecutionContext,
    ) -> Result<String, EngineError> {
        if parent.is_ancestor(workflow_id) {
            return Err(EngineError::Recursion {
                workflow_id: workflow_id.to_string(),
            });
        }
        let prepared = self
            .prepare(workflow_id, input, TriggerType::Subworkflow, Some(parent))
            .await?;
        let execution_id = prepared.ctx.execution_id.clone();
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.drive(prepared).await {
                tracing::warn!(error = %err, "async subworkflow execution failed");
            }
        });
        Ok(execution_id)
    }
}

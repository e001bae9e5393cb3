//! Per-run execution context.

use std::collections::HashMap;
use std::sync::Arc;

use conflux_core::{EngineError, JsonMap};
use conflux_execution::TriggerType;
use conflux_expression::NameResolver;
use conflux_log::ExecutionLogger;
use conflux_workflow::Workflow;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::merge_hub::MergeHub;
use crate::ports::{Credentials, Settings, SubExecutor};
use crate::registry::HandlerRegistry;

/// Everything a handler may touch during one run.
///
/// Owned exclusively by one execution and never shared across concurrent
/// executions. Cloning is cheap — the shared state sits behind `Arc` — so
/// the traversal hands an owned copy to every spawned handler task.
///
/// The per-node output map is written once per node (when its handler
/// completes) and read by downstream handlers and the interpolator.
#[derive(Clone)]
pub struct ExecutionContext {
    /// The execution this context belongs to.
    pub execution_id: String,
    /// The workflow being executed, read-only.
    pub workflow: Arc<Workflow>,
    /// What started the run.
    pub trigger_type: TriggerType,
    /// The payload the run started with.
    pub initial_input: JsonMap,
    /// Cooperative cancellation for the whole run.
    pub cancellation: CancellationToken,
    /// The execution log pipeline, bound to this execution id.
    pub logger: ExecutionLogger,
    node_outputs: Arc<RwLock<HashMap<String, JsonMap>>>,
    credentials: Arc<dyn Credentials>,
    settings: Arc<dyn Settings>,
    registry: Arc<HandlerRegistry>,
    merges: Arc<MergeHub>,
    ancestors: Arc<Vec<String>>,
    sub_executor: Option<Arc<dyn SubExecutor>>,
}

impl ExecutionContext {
    /// Create a context for a fresh run.
    ///
    /// The ancestor chain starts with the workflow's own id; subworkflow
    /// invocations extend it via [`with_ancestors`](Self::with_ancestors).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: impl Into<String>,
        workflow: Arc<Workflow>,
        trigger_type: TriggerType,
        initial_input: JsonMap,
        credentials: Arc<dyn Credentials>,
        settings: Arc<dyn Settings>,
        logger: ExecutionLogger,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let ancestors = Arc::new(vec![workflow.id.clone()]);
        Self {
            execution_id: execution_id.into(),
            workflow,
            trigger_type,
            initial_input,
            cancellation: CancellationToken::new(),
            logger,
            node_outputs: Arc::new(RwLock::new(HashMap::new())),
            credentials,
            settings,
            registry,
            merges: Arc::new(MergeHub::new()),
            ancestors,
            sub_executor: None,
        }
    }

    /// Replace the cancellation token (child runs inherit a child token).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Replace the ancestor workflow-id chain.
    #[must_use]
    pub fn with_ancestors(mut self, ancestors: Vec<String>) -> Self {
        self.ancestors = Arc::new(ancestors);
        self
    }

    /// Attach the sub-executor used by subworkflow nodes.
    #[must_use]
    pub fn with_sub_executor(mut self, sub_executor: Arc<dyn SubExecutor>) -> Self {
        self.sub_executor = Some(sub_executor);
        self
    }

    /// Build the interpolation data for a handler: the upstream input,
    /// optionally unioned with the workflow settings map. Input keys win
    /// over settings keys.
    #[must_use]
    pub fn interpolation_data(&self, input: &JsonMap, with_settings: bool) -> serde_json::Value {
        let mut data = input.clone();
        if with_settings {
            for (key, value) in &self.workflow.settings {
                data.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        serde_json::Value::Object(data)
    }

    /// Fail with [`EngineError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancellation.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publish a node's output. Each node's output is written exactly once;
    /// the traversal guarantees it, and this asserts it in debug builds.
    pub fn publish_node_output(&self, node_id: &str, output: JsonMap) {
        let previous = self
            .node_outputs
            .write()
            .insert(node_id.to_string(), output);
        debug_assert!(
            previous.is_none(),
            "node `{node_id}` output published twice"
        );
    }

    /// A node's published output, if it has completed.
    #[must_use]
    pub fn node_output(&self, node_id: &str) -> Option<JsonMap> {
        self.node_outputs.read().get(node_id).cloned()
    }

    /// Snapshot of every published output, keyed by node id.
    #[must_use]
    pub fn all_node_outputs(&self) -> HashMap<String, JsonMap> {
        self.node_outputs.read().clone()
    }

    /// The credential port.
    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn Credentials> {
        &self.credentials
    }

    /// The settings port.
    #[must_use]
    pub fn settings(&self) -> &Arc<dyn Settings> {
        &self.settings
    }

    /// The handler registry (used to dispatch embedded operations).
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The merge delivery hub for this execution.
    #[must_use]
    pub fn merges(&self) -> &Arc<MergeHub> {
        &self.merges
    }

    /// Workflow ids from the root run down to this one, self included.
    #[must_use]
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Whether a workflow id appears anywhere in the ancestor chain.
    #[must_use]
    pub fn is_ancestor(&self, workflow_id: &str) -> bool {
        self.ancestors.iter().any(|id| id == workflow_id)
    }

    /// The sub-executor, when the host wired one.
    #[must_use]
    pub fn sub_executor(&self) -> Option<&Arc<dyn SubExecutor>> {
        self.sub_executor.as_ref()
    }
}

/// `{{name}}` placeholders that the data map does not cover resolve as
/// credential names.
impl NameResolver for ExecutionContext {
    fn resolve(&self, name: &str) -> Option<String> {
        self.credentials.decrypted_by_name(name)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("workflow_id", &self.workflow.id)
            .field("trigger_type", &self.trigger_type)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("published_outputs", &self.node_outputs.read().len())
            .finish_non_exhaustive()
    }
}

//! Shared fixtures for this crate's unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap};
use conflux_execution::TriggerType;
use conflux_handler::{ExecutionContext, HandlerRegistry, NodeHandler};
use conflux_log::{ExecutionLogger, SinkSet};
use conflux_storage::{MemoryCredentialStore, MemorySettings};
use conflux_workflow::{Node, Workflow};
use serde_json::Value;

/// Fails the first `fail_first` invocations, then succeeds.
pub struct FlakyHandler {
    calls: AtomicUsize,
    fail_first: usize,
}

impl FlakyHandler {
    pub fn new(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeHandler for FlakyHandler {
    fn node_type(&self) -> &str {
        "flaky"
    }

    async fn execute(
        &self,
        _node: &Node,
        mut input: JsonMap,
        _ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(EngineError::External {
                status: 503,
                detail: format!("transient failure {call}"),
            })
        } else {
            input.insert("attempts".into(), serde_json::json!(call + 1));
            Ok(input)
        }
    }
}

/// A context wired to the built-in handlers plus any extras.
pub fn context_with(extra: Vec<Arc<dyn NodeHandler>>) -> ExecutionContext {
    let mut registry = HandlerRegistry::new();
    registry.register_all(crate::all_handlers());
    registry.register_all(extra);

    let workflow = Arc::new(Workflow::new("wf-test", "test"));
    ExecutionContext::new(
        "exec-test",
        workflow,
        TriggerType::Manual,
        JsonMap::new(),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(MemorySettings::new()),
        ExecutionLogger::new("exec-test", Arc::new(SinkSet::new())),
        Arc::new(registry),
    )
}

/// A context wired to the built-in handlers only.
pub fn context() -> ExecutionContext {
    context_with(Vec::new())
}

/// Unwrap a `json!` object literal into a map.
pub fn map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// A node of the given type with the given `json!` object parameters.
pub fn node(node_type: &str, parameters: Value) -> Node {
    Node::new(format!("{node_type}-1"), node_type).with_parameters(map(parameters))
}

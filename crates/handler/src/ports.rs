//! Port traits the engine consumes.
//!
//! Persistence and credential decryption live outside the engine; these
//! traits are the whole surface the engine calls on them. `conflux-storage`
//! ships in-memory implementations; hosts substitute their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conflux_core::{EngineError, JsonMap};
use conflux_execution::{Execution, ExecutionStatus, NodeExecution, TriggerType};
use conflux_workflow::Workflow;
use serde_json::Value;

use crate::context::ExecutionContext;

/// Read access to stored workflows.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Find a workflow by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<Workflow>, EngineError>;

    /// Find a workflow by display name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Workflow>, EngineError>;
}

/// Durable record of executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a row in status `Running` and return its id.
    async fn create_running(
        &self,
        workflow_id: &str,
        trigger_type: TriggerType,
        started_at: DateTime<Utc>,
        input: JsonMap,
    ) -> Result<String, EngineError>;

    /// Append a node row to a running execution.
    async fn append_node_execution(
        &self,
        execution_id: &str,
        node: NodeExecution,
    ) -> Result<(), EngineError>;

    /// Seal an execution with a terminal status.
    async fn finalize(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        output: JsonMap,
        error_message: Option<String>,
    ) -> Result<(), EngineError>;

    /// All executions recorded for a workflow.
    async fn find_by_workflow_id(&self, workflow_id: &str)
    -> Result<Vec<Execution>, EngineError>;

    /// One execution by id.
    async fn find_by_id(&self, execution_id: &str) -> Result<Option<Execution>, EngineError>;
}

/// Decrypted credential lookup.
///
/// The port is synchronous: decryption is local work on an already-loaded
/// secret, and the interpolator resolves `{{name}}` fallbacks mid-string.
/// A backend with remote storage fronts this with a cache.
pub trait Credentials: Send + Sync {
    /// Decrypted credential value by id.
    fn decrypted_by_id(&self, id: &str) -> Option<String>;

    /// Decrypted credential value by display name.
    fn decrypted_by_name(&self, name: &str) -> Option<String>;
}

/// Typed configuration lookup.
///
/// Implementations store raw JSON values; the typed getters with defaults
/// are provided so call sites stay one line.
pub trait Settings: Send + Sync {
    /// Raw value for a key.
    fn get(&self, key: &str) -> Option<Value>;

    /// String value, with a default.
    fn get_str(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            _ => default.to_string(),
        }
    }

    /// Integer value, with a default.
    fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            _ => default,
        }
    }

    /// Unsigned value, with a default.
    fn get_u64(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            _ => default,
        }
    }

    /// Float value, with a default.
    fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            _ => default,
        }
    }

    /// Boolean value, with a default.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => b,
            _ => default,
        }
    }
}

/// The engine surface the subworkflow handler calls.
///
/// Implemented by the executor; injected into the context so `conflux-nodes`
/// never depends on `conflux-engine`.
#[async_trait]
pub trait SubExecutor: Send + Sync {
    /// Resolve a subworkflow target to `(id, name)`, trying id first, then
    /// display name.
    async fn resolve_workflow(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Option<(String, String)>, EngineError>;

    /// Run a child workflow to completion, inheriting the parent's
    /// cancellation and ancestor chain, and return its terminal execution.
    async fn execute_child(
        &self,
        workflow_id: &str,
        input: JsonMap,
        parent: &ExecutionContext,
    ) -> Result<Execution, EngineError>;

    /// Start a child workflow without waiting; returns the child execution
    /// id.
    async fn spawn_child(
        &self,
        workflow_id: &str,
        input: JsonMap,
        parent: &ExecutionContext,
    ) -> Result<String, EngineError>;
}

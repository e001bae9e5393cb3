//! In-memory execution store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conflux_core::{EngineError, JsonMap};
use conflux_execution::{Execution, ExecutionStatus, NodeExecution, TriggerType};
use conflux_handler::ExecutionStore;
use dashmap::DashMap;

/// Execution rows held in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    rows: DashMap<String, Execution>,
}

impl MemoryExecutionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create_running(
        &self,
        workflow_id: &str,
        trigger_type: TriggerType,
        started_at: DateTime<Utc>,
        input: JsonMap,
    ) -> Result<String, EngineError> {
        let id = conflux_core::id::prefixed("exec");
        let mut row = Execution::running(id.clone(), workflow_id, trigger_type, input);
        row.started_at = started_at;
        self.rows.insert(id.clone(), row);
        Ok(id)
    }

    async fn append_node_execution(
        &self,
        execution_id: &str,
        node: NodeExecution,
    ) -> Result<(), EngineError> {
        let mut row = self
            .rows
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::Store(format!("unknown execution {execution_id}")))?;
        row.node_executions.push(node);
        Ok(())
    }

    async fn finalize(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        output: JsonMap,
        error_message: Option<String>,
    ) -> Result<(), EngineError> {
        let mut row = self
            .rows
            .get_mut(execution_id)
            .ok_or_else(|| EngineError::Store(format!("unknown execution {execution_id}")))?;
        row.status = status;
        row.finished_at = Some(finished_at);
        row.output = output;
        row.error_message = error_message;
        Ok(())
    }

    async fn find_by_workflow_id(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Execution>, EngineError> {
        let mut rows: Vec<Execution> = self
            .rows
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .map(|entry| entry.clone())
            .collect();
        rows.sort_by_key(|row| row.started_at);
        Ok(rows)
    }

    async fn find_by_id(&self, execution_id: &str) -> Result<Option<Execution>, EngineError> {
        Ok(self.rows.get(execution_id).map(|entry| entry.clone()))
    }
}

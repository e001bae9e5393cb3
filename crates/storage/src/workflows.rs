//! In-memory workflow store.

use async_trait::async_trait;
use conflux_core::EngineError;
use conflux_handler::WorkflowStore;
use conflux_workflow::Workflow;
use dashmap::DashMap;

/// Workflows held in a process-local map, queryable by id and by name.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    by_id: DashMap<String, Workflow>,
}

impl MemoryWorkflowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workflow.
    pub fn upsert(&self, workflow: Workflow) {
        self.by_id.insert(workflow.id.clone(), workflow);
    }

    /// Remove a workflow by id. Returns `true` if one was removed.
    pub fn remove(&self, id: &str) -> bool {
        self.by_id.remove(id).is_some()
    }

    /// Number of stored workflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Workflow>, EngineError> {
        Ok(self.by_id.get(id).map(|entry| entry.clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Workflow>, EngineError> {
        Ok(self
            .by_id
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.clone()))
    }
}

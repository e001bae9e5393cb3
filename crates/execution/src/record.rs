//! Execution and node-execution rows.

use chrono::{DateTime, Utc};
use conflux_core::JsonMap;
use serde::{Deserialize, Serialize};

use crate::status::{ExecutionStatus, NodeStatus, TriggerType};

/// One recorded run of a workflow.
///
/// Created in status `Running` when the run starts, mutated only by the
/// engine, sealed with [`finalize`](Execution::finalize) at termination.
/// `finished_at` is set iff the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Opaque execution id.
    pub id: String,
    /// The workflow this run executed.
    pub workflow_id: String,
    /// Current status.
    pub status: ExecutionStatus,
    /// What started the run.
    pub trigger_type: TriggerType,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// The initial input payload.
    #[serde(default)]
    pub input: JsonMap,
    /// The run's output payload.
    #[serde(default)]
    pub output: JsonMap,
    /// Human-readable message of the first unhandled error, for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Per-node rows, in handler completion order.
    #[serde(default)]
    pub node_executions: Vec<NodeExecution>,
}

impl Execution {
    /// Create a running execution row stamped now.
    pub fn running(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        trigger_type: TriggerType,
        input: JsonMap,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            trigger_type,
            started_at: Utc::now(),
            finished_at: None,
            input,
            output: JsonMap::new(),
            error_message: None,
            node_executions: Vec::new(),
        }
    }

    /// Seal the row with a terminal status.
    pub fn finalize(
        &mut self,
        status: ExecutionStatus,
        output: JsonMap,
        error_message: Option<String>,
    ) {
        debug_assert!(status.is_terminal(), "finalize requires a terminal status");
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.output = output;
        self.error_message = error_message;
    }

    /// Wall-clock duration, once terminal.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// The row for a node, if one was recorded.
    #[must_use]
    pub fn node_execution(&self, node_id: &str) -> Option<&NodeExecution> {
        self.node_executions.iter().find(|n| n.node_id == node_id)
    }
}

/// The record of one node's participation in a run.
///
/// Appended to the parent execution in the order each node's handler
/// returns, which across concurrent branches is not node-id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    /// The node's id in the workflow graph.
    pub node_id: String,
    /// Display name at execution time.
    pub node_name: String,
    /// The node's type tag.
    pub node_type: String,
    /// Outcome.
    pub status: NodeStatus,
    /// When the handler started (or the skip was recorded).
    pub started_at: DateTime<Utc>,
    /// When the handler finished.
    pub finished_at: DateTime<Utc>,
    /// The effective input the handler saw.
    #[serde(default)]
    pub input: JsonMap,
    /// The output the handler produced.
    #[serde(default)]
    pub output: JsonMap,
    /// Failure message, for failed nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NodeExecution {
    /// Handler wall-clock duration.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

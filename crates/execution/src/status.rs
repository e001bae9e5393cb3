//! Status and trigger vocabulary.

use serde::{Deserialize, Serialize};

/// The overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created but not yet started.
    Pending,
    /// Actively running nodes.
    Running,
    /// Every handler that ran terminated normally.
    Success,
    /// A handler failed and no tryCatch absorbed it, or the run timed out.
    Failed,
    /// Cancellation was observed.
    Cancelled,
    /// Parked on an external event (webhook resume, wait node).
    Waiting,
}

impl ExecutionStatus {
    /// Returns `true` if the execution has reached a final state.
    ///
    /// `finished_at` is set iff the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if the execution completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Waiting => "waiting",
        };
        f.write_str(name)
    }
}

/// The outcome of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Handler in flight.
    Running,
    /// Handler returned normally (or the node was disabled and passed
    /// through).
    Success,
    /// Handler failed.
    Failed,
    /// Every path to the node was gated off; no handler ran, no output was
    /// published.
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// What started an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Started by a user or the engine API.
    Manual,
    /// Started by the scheduler.
    Schedule,
    /// Started by an inbound webhook.
    Webhook,
    /// Started by a parent execution's subworkflow node.
    Subworkflow,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Schedule => "schedule",
            Self::Webhook => "webhook",
            Self::Subworkflow => "subworkflow",
        };
        f.write_str(name)
    }
}

//! Log entry, level, and category types.

use chrono::{DateTime, Utc};
use conflux_core::JsonMap;
use serde::{Deserialize, Serialize};

/// Severity of a log entry. Ordered so sinks can filter with `>=`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Fine-grained tracing.
    Trace,
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// A failure.
    Error,
    /// A failure that ends the run.
    Fatal,
}

impl LogLevel {
    /// Parse a level name, case-insensitively. Unknown names are `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// What kind of event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// The execution started.
    ExecutionStart,
    /// The execution reached a terminal status.
    ExecutionEnd,
    /// A node's handler is about to run.
    NodeStart,
    /// A node's handler finished.
    NodeEnd,
    /// A node was skipped because every path to it was gated off.
    NodeSkipped,
    /// A failure, with error kind and message in the context.
    Error,
    /// Handler- or host-emitted entry with no engine category.
    Custom,
}

/// One structured entry in the execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Opaque entry id.
    pub id: String,
    /// The execution this entry belongs to.
    pub execution_id: String,
    /// When the entry was produced.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Event kind.
    pub category: LogCategory,
    /// Human-readable message.
    pub message: String,
    /// Structured context (node id/type, durations, error kind, …).
    #[serde(default)]
    pub context: JsonMap,
}

impl LogEntry {
    /// Create an entry stamped now.
    pub fn new(
        execution_id: impl Into<String>,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        context: JsonMap,
    ) -> Self {
        Self {
            id: conflux_core::id::fresh(),
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
            level,
            category,
            message: message.into(),
            context,
        }
    }
}

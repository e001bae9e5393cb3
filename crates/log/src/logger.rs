//! The sink set and the per-execution logger.

use std::sync::Arc;

use conflux_core::JsonMap;
use parking_lot::RwLock;
use serde_json::json;

use crate::entry::{LogCategory, LogEntry, LogLevel};
use crate::sink::LogSink;

/// The process-wide set of registered sinks.
///
/// Broadcast takes a snapshot of the list, so sinks can be added or removed
/// while other tasks are fanning entries out. Each sink filters by its
/// enable flag and minimum level; a failing sink is reported through
/// `tracing::warn!` and the remaining sinks still receive the entry.
#[derive(Default)]
pub struct SinkSet {
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
}

impl SinkSet {
    /// Create an empty sink set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink.
    pub fn add(&self, sink: Arc<dyn LogSink>) {
        self.sinks.write().push(sink);
    }

    /// Remove every sink with the given name. Returns how many were removed.
    pub fn remove(&self, name: &str) -> usize {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|s| s.name() != name);
        before - sinks.len()
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// Returns `true` if no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    /// Fan an entry out to every eligible sink.
    pub fn broadcast(&self, entry: &LogEntry) {
        let snapshot: Vec<Arc<dyn LogSink>> = self.sinks.read().clone();
        for sink in snapshot {
            if !sink.enabled() || entry.level < sink.min_level() {
                continue;
            }
            if let Err(err) = sink.write(entry) {
                tracing::warn!(sink = sink.name(), error = %err, "log sink write failed");
            }
        }
    }
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .sinks
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        f.debug_struct("SinkSet").field("sinks", &names).finish()
    }
}

/// Produces [`LogEntry`] values for one execution and hands them to the
/// shared [`SinkSet`].
#[derive(Debug, Clone)]
pub struct ExecutionLogger {
    execution_id: String,
    sinks: Arc<SinkSet>,
}

impl ExecutionLogger {
    /// Create a logger bound to an execution id.
    pub fn new(execution_id: impl Into<String>, sinks: Arc<SinkSet>) -> Self {
        Self {
            execution_id: execution_id.into(),
            sinks,
        }
    }

    /// The execution this logger writes for.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Emit an entry with full control over level and category.
    pub fn log(
        &self,
        level: LogLevel,
        category: LogCategory,
        message: impl Into<String>,
        context: JsonMap,
    ) {
        let entry = LogEntry::new(&self.execution_id, level, category, message, context);
        self.sinks.broadcast(&entry);
    }

    /// EXECUTION_START entry.
    pub fn execution_start(&self, workflow_id: &str, trigger: &str) {
        let mut context = JsonMap::new();
        context.insert("workflowId".into(), json!(workflow_id));
        context.insert("trigger".into(), json!(trigger));
        self.log(
            LogLevel::Info,
            LogCategory::ExecutionStart,
            "execution started",
            context,
        );
    }

    /// EXECUTION_END entry with terminal status and duration.
    pub fn execution_end(&self, status: &str, duration_ms: u64) {
        let mut context = JsonMap::new();
        context.insert("status".into(), json!(status));
        context.insert("durationMs".into(), json!(duration_ms));
        self.log(
            LogLevel::Info,
            LogCategory::ExecutionEnd,
            format!("execution finished: {status}"),
            context,
        );
    }

    /// NODE_START entry.
    pub fn node_start(&self, node_id: &str, node_type: &str) {
        let mut context = JsonMap::new();
        context.insert("nodeId".into(), json!(node_id));
        context.insert("nodeType".into(), json!(node_type));
        self.log(
            LogLevel::Debug,
            LogCategory::NodeStart,
            format!("node {node_id} started"),
            context,
        );
    }

    /// NODE_END entry.
    pub fn node_end(&self, node_id: &str, node_type: &str, status: &str, duration_ms: u64) {
        let mut context = JsonMap::new();
        context.insert("nodeId".into(), json!(node_id));
        context.insert("nodeType".into(), json!(node_type));
        context.insert("status".into(), json!(status));
        context.insert("durationMs".into(), json!(duration_ms));
        self.log(
            LogLevel::Debug,
            LogCategory::NodeEnd,
            format!("node {node_id} finished: {status}"),
            context,
        );
    }

    /// NODE_SKIPPED entry.
    pub fn node_skipped(&self, node_id: &str) {
        let mut context = JsonMap::new();
        context.insert("nodeId".into(), json!(node_id));
        self.log(
            LogLevel::Debug,
            LogCategory::NodeSkipped,
            format!("node {node_id} skipped"),
            context,
        );
    }

    /// ERROR entry carrying node identity and the error kind tag.
    pub fn failure(&self, node_id: &str, node_type: &str, kind: &str, message: &str) {
        let mut context = JsonMap::new();
        context.insert("nodeId".into(), json!(node_id));
        context.insert("nodeType".into(), json!(node_type));
        context.insert("errorKind".into(), json!(kind));
        context.insert("message".into(), json!(message));
        self.log(LogLevel::Error, LogCategory::Error, message, context);
    }

    /// Handler-facing INFO entry.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, LogCategory::Custom, message, JsonMap::new());
    }

    /// Handler-facing DEBUG entry.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, LogCategory::Custom, message, JsonMap::new());
    }

    /// Handler-facing WARN entry.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, LogCategory::Custom, message, JsonMap::new());
    }

    /// Handler-facing ERROR entry.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, LogCategory::Custom, message, JsonMap::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkError};

    struct FailingSink;

    impl LogSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }
        fn write(&self, _entry: &LogEntry) -> Result<(), SinkError> {
            Err(SinkError::new("disk on fire"))
        }
    }

    #[test]
    fn broadcast_respects_min_level() {
        let sinks = Arc::new(SinkSet::new());
        let errors_only = Arc::new(MemorySink::new(64, LogLevel::Error));
        let everything = Arc::new(MemorySink::new(64, LogLevel::Trace));
        sinks.add(errors_only.clone());
        sinks.add(everything.clone());

        let logger = ExecutionLogger::new("exec-1", sinks);
        logger.info("hello");
        logger.error("boom");

        assert_eq!(errors_only.entries().len(), 1);
        assert_eq!(everything.entries().len(), 2);
    }

    #[test]
    fn broadcast_skips_disabled_sinks() {
        let sinks = Arc::new(SinkSet::new());
        let sink = Arc::new(MemorySink::default());
        sinks.add(sink.clone());
        sink.set_enabled(false);

        ExecutionLogger::new("exec-1", sinks).info("ignored");
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn failing_sink_does_not_stop_others() {
        let sinks = Arc::new(SinkSet::new());
        let healthy = Arc::new(MemorySink::default());
        sinks.add(Arc::new(FailingSink));
        sinks.add(healthy.clone());

        ExecutionLogger::new("exec-1", sinks).info("still delivered");
        assert_eq!(healthy.entries().len(), 1);
    }

    #[test]
    fn remove_by_name() {
        let sinks = SinkSet::new();
        sinks.add(Arc::new(MemorySink::default()));
        sinks.add(Arc::new(MemorySink::default()));
        assert_eq!(sinks.len(), 2);
        assert_eq!(sinks.remove("memory"), 2);
        assert!(sinks.is_empty());
    }

    #[test]
    fn engine_categories_carry_context() {
        let sinks = Arc::new(SinkSet::new());
        let sink = Arc::new(MemorySink::default());
        sinks.add(sink.clone());

        let logger = ExecutionLogger::new("exec-1", sinks);
        logger.node_start("n1", "httpRequest");
        logger.node_end("n1", "httpRequest", "success", 12);
        logger.failure("n1", "httpRequest", "timeout", "deadline exceeded");

        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].category, LogCategory::NodeStart);
        assert_eq!(
            entries[2].context.get("errorKind"),
            Some(&serde_json::json!("timeout"))
        );
    }
}

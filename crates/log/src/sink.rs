//! Log sinks: where entries end up.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::entry::{LogEntry, LogLevel};

/// Why a sink rejected an entry. The pipeline only logs these; they carry a
/// message and nothing else.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SinkError(
    /// What went wrong, as the sink described it.
    pub String,
);

impl SinkError {
    /// Create a sink error.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// A destination for log entries.
///
/// Sinks are registered on the [`SinkSet`](crate::SinkSet) and receive every
/// entry at or above their minimum level while enabled. `write` failures are
/// reported by the pipeline via `tracing::warn!` — they never reach the
/// engine.
pub trait LogSink: Send + Sync {
    /// Short sink name, for diagnostics.
    fn name(&self) -> &str;

    /// Whether the sink currently accepts entries.
    fn enabled(&self) -> bool {
        true
    }

    /// Entries below this level are filtered out before `write`.
    fn min_level(&self) -> LogLevel {
        LogLevel::Trace
    }

    /// Persist one entry.
    fn write(&self, entry: &LogEntry) -> Result<(), SinkError>;
}

/// Forwards entries to the `tracing` subscriber at the mapped level.
#[derive(Debug)]
pub struct ConsoleSink {
    min_level: LogLevel,
}

impl ConsoleSink {
    /// Create a console sink passing everything at or above `min_level`.
    #[must_use]
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let category = format!("{:?}", entry.category);
        let context = serde_json::Value::Object(entry.context.clone());
        match entry.level {
            LogLevel::Trace => tracing::trace!(
                execution_id = %entry.execution_id, category = %category, context = %context,
                "{}", entry.message
            ),
            LogLevel::Debug => tracing::debug!(
                execution_id = %entry.execution_id, category = %category, context = %context,
                "{}", entry.message
            ),
            LogLevel::Info => tracing::info!(
                execution_id = %entry.execution_id, category = %category, context = %context,
                "{}", entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                execution_id = %entry.execution_id, category = %category, context = %context,
                "{}", entry.message
            ),
            LogLevel::Error | LogLevel::Fatal => tracing::error!(
                execution_id = %entry.execution_id, category = %category, context = %context,
                "{}", entry.message
            ),
        }
        Ok(())
    }
}

/// Keeps the last `capacity` entries in memory.
///
/// The observation surface for tests, and for hosts that want to show recent
/// run activity without standing up persistence.
#[derive(Debug)]
pub struct MemorySink {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    min_level: LogLevel,
    enabled: AtomicBool,
}

impl MemorySink {
    /// Create a sink retaining up to `capacity` entries at `min_level` and
    /// above.
    #[must_use]
    pub fn new(capacity: usize, min_level: LogLevel) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            min_level,
            enabled: AtomicBool::new(true),
        }
    }

    /// Snapshot of the retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Retained entries matching a category.
    #[must_use]
    pub fn entries_with_category(&self, category: crate::LogCategory) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    /// Toggle the sink on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Drop all retained entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(1024, LogLevel::Trace)
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Ok(())
    }
}

/// Appends entries as line-delimited JSON to a file.
#[derive(Debug)]
pub struct JsonFileSink {
    file: Mutex<File>,
    min_level: LogLevel,
}

impl JsonFileSink {
    /// Open (or create) the file at `path` for appending.
    pub fn open(path: impl AsRef<Path>, min_level: LogLevel) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            min_level,
        })
    }
}

impl LogSink for JsonFileSink {
    fn name(&self) -> &str {
        "json-file"
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn write(&self, entry: &LogEntry) -> Result<(), SinkError> {
        let line = serde_json::to_string(entry).map_err(|e| SinkError::new(e.to_string()))?;
        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogCategory;

    fn entry(level: LogLevel, message: &str) -> LogEntry {
        LogEntry::new(
            "exec-1",
            level,
            LogCategory::Custom,
            message,
            conflux_core::JsonMap::new(),
        )
    }

    #[test]
    fn memory_sink_retains_and_rotates() {
        let sink = MemorySink::new(2, LogLevel::Trace);
        sink.write(&entry(LogLevel::Info, "one")).unwrap();
        sink.write(&entry(LogLevel::Info, "two")).unwrap();
        sink.write(&entry(LogLevel::Info, "three")).unwrap();

        let messages: Vec<_> = sink.entries().iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["two".to_string(), "three".to_string()]);
    }

    #[test]
    fn memory_sink_enable_toggle() {
        let sink = MemorySink::default();
        assert!(sink.enabled());
        sink.set_enabled(false);
        assert!(!sink.enabled());
    }

    #[test]
    fn file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let sink = JsonFileSink::open(&path, LogLevel::Trace).unwrap();
        sink.write(&entry(LogLevel::Info, "hello")).unwrap();
        sink.write(&entry(LogLevel::Warn, "careful")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: LogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.message, "hello");
    }
}

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Conflux Log
//!
//! The execution log pipeline: the product-facing record of what a run did,
//! distinct from the developer-facing `tracing` output.
//!
//! [`ExecutionLogger`] produces [`LogEntry`] values and broadcasts them to
//! every registered [`LogSink`]. Each sink carries an enable flag and a
//! minimum level; a failing sink is reported through `tracing` and never
//! propagates into the engine. The sink list supports adding and removing
//! sinks while entries are being broadcast from other tasks.

pub mod entry;
pub mod logger;
pub mod sink;

pub use entry::{LogCategory, LogEntry, LogLevel};
pub use logger::{ExecutionLogger, SinkSet};
pub use sink::{ConsoleSink, JsonFileSink, LogSink, MemorySink, SinkError};

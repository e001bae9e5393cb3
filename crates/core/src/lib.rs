#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Conflux Core
//!
//! Shared vocabulary for the conflux workflow engine:
//!
//! - [`JsonMap`] and the typed getters over it — the dynamic payload that
//!   flows between nodes
//! - [`EngineError`] — the error taxonomy every layer speaks
//! - id minting for executions, nodes, and log entries
//!
//! Everything above this crate (workflow model, handlers, engine) exchanges
//! data as `serde_json` values; the helpers here keep the many
//! "read a parameter with a default" sites small and safe.

pub mod error;
pub mod id;
pub mod value;

pub use error::EngineError;
pub use value::JsonMap;

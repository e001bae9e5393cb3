#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Conflux Handler
//!
//! The seam between the engine and node implementations:
//!
//! - [`NodeHandler`] — the contract every node type implements
//! - [`HandlerRegistry`] — node-type string → handler, resolved at startup
//! - [`ExecutionContext`] — per-run state handed to every handler
//! - the store ports the engine consumes ([`WorkflowStore`],
//!   [`ExecutionStore`], [`Credentials`], [`Settings`], [`SubExecutor`])
//! - [`MergeHub`] — the delivery channel between the traversal and an
//!   in-flight merge handler
//!
//! Persistence itself lives behind the ports; `conflux-storage` ships
//! in-memory implementations.

pub mod context;
pub mod keys;
pub mod merge_hub;
pub mod node_handler;
pub mod ports;
pub mod registry;

pub use context::ExecutionContext;
pub use merge_hub::MergeHub;
pub use node_handler::NodeHandler;
pub use ports::{Credentials, ExecutionStore, Settings, SubExecutor, WorkflowStore};
pub use registry::HandlerRegistry;

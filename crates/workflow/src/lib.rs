#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Conflux Workflow
//!
//! The immutable workflow description: a directed graph of typed [`Node`]s
//! connected by [`Edge`]s, plus workflow-level settings. Workflows are
//! created and updated by an external store and referenced read-only during
//! a run.
//!
//! [`validate`] enforces the structural invariants the engine relies on:
//! unique node ids, edges that reference existing nodes, no self-edges, no
//! edges into trigger nodes, and acyclicity of the plain edge graph (the
//! only legal re-entry lives inside the loop handler).

pub mod model;
pub mod validate;

pub use model::{Edge, Node, Position, Workflow};
pub use validate::validate;

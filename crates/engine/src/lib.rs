#![forbid(unsafe_code)]

//! # Conflux Engine
//!
//! The executor: load a workflow, walk its graph from the trigger frontier,
//! run each reached node through its handler exactly once, thread outputs
//! along active edges, and seal a durable [`Execution`] record.
//!
//! The traversal honors per-node-type branch gating (`if`, `switch`),
//! skip-cascades nodes whose every path was gated off, starts merge nodes
//! on their first delivery and routes later deliveries to the in-flight
//! handler, runs independent ready nodes concurrently, and terminates the
//! run on the first unabsorbed error, on cancellation, or on the overall
//! timeout.
//!
//! [`Execution`]: conflux_execution::Execution

mod executor;
mod gating;
mod traversal;

pub use executor::{Executor, ExecutorBuilder, ExecutionHandle};

use std::sync::Arc;

use conflux_handler::HandlerRegistry;

/// A registry populated with every built-in handler.
#[must_use]
pub fn default_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register_all(conflux_nodes::all_handlers());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_every_builtin() {
        let registry = default_registry();
        assert!(registry.contains("manualTrigger"));
        assert!(registry.contains("merge"));
        assert!(registry.contains("rate_limit"));
        assert!(registry.contains("rag"));
        assert_eq!(registry.len(), conflux_nodes::all_handlers().len());
        let _shared: Arc<HandlerRegistry> = Arc::new(registry);
    }
}

//! Node-type → handler lookup.

use std::collections::HashMap;
use std::sync::Arc;

use conflux_core::EngineError;

use crate::node_handler::NodeHandler;

/// Maps node type strings to their handlers.
///
/// Populated at startup from the set of registered handlers and read-only
/// afterwards — the engine wraps it in `Arc` and shares it with every
/// execution context.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own `node_type()`. Overwrites any
    /// existing handler for the same type.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        self.handlers
            .insert(handler.node_type().to_string(), handler);
    }

    /// Register every handler in the iterator.
    pub fn register_all(&mut self, handlers: impl IntoIterator<Item = Arc<dyn NodeHandler>>) {
        for handler in handlers {
            self.register(handler);
        }
    }

    /// Look up the handler for a node type.
    pub fn get(&self, node_type: &str) -> Result<Arc<dyn NodeHandler>, EngineError> {
        self.handlers
            .get(node_type)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNodeType(node_type.to_string()))
    }

    /// Whether a handler is registered for the type.
    #[must_use]
    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    /// The registered type tags, sorted.
    #[must_use]
    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("count", &self.handlers.len())
            .field("types", &self.node_types())
            .finish()
    }
}

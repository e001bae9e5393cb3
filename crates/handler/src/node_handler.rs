//! The contract every node type implements.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap};
use conflux_workflow::Node;

use crate::context::ExecutionContext;

/// The code that realises a node type's semantics.
///
/// Handlers receive the node description, the merged upstream input, and the
/// per-run [`ExecutionContext`]. They interact with the world only through
/// the accessors the context exposes (credentials, settings, logger,
/// cancellation, sub-executor).
///
/// Handlers must honor cancellation at every I/O boundary and between
/// internal steps, failing with [`EngineError::Cancelled`] when the token
/// fires — `ctx.check_cancelled()?` is the idiom.
#[async_trait]
pub trait NodeHandler: Send + Sync + 'static {
    /// The node type tag this handler serves, e.g. `httpRequest`.
    fn node_type(&self) -> &str;

    /// Execute the node against its effective input.
    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError>;
}

impl std::fmt::Debug for dyn NodeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandler")
            .field("node_type", &self.node_type())
            .finish()
    }
}

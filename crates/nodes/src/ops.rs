//! Sequential execution of embedded operation lists.
//!
//! The coordination handlers (`loop`, `tryCatch`, `retry`, `rate_limit`)
//! carry bodies as JSON arrays of operations:
//!
//! ```json
//! [{ "type": "set", "parameters": { "values": { "x": 1 } } },
//!  { "type": "code", "parameters": { "script": "result + 1" } }]
//! ```
//!
//! Each operation is dispatched through the registry like a real node;
//! its output becomes the next operation's input.

use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::ExecutionContext;
use conflux_workflow::Node;
use serde_json::Value;

/// Run a list of operations in order, threading the payload through.
///
/// An empty list returns the input unchanged. Cancellation is checked
/// before each operation; the first failing operation aborts the rest.
pub async fn run_operations(
    operations: &[Value],
    input: JsonMap,
    ctx: &ExecutionContext,
) -> Result<JsonMap, EngineError> {
    let mut current = input;

    for (index, op) in operations.iter().enumerate() {
        ctx.check_cancelled()?;

        let node = operation_node(op, index)?;
        let handler = ctx.registry().get(&node.node_type)?;
        current = handler.execute(&node, current, ctx).await?;
    }

    Ok(current)
}

/// Build the synthetic node an operation entry describes.
fn operation_node(op: &Value, index: usize) -> Result<Node, EngineError> {
    let Value::Object(map) = op else {
        return Err(EngineError::handler(format!(
            "operation {index} is not an object"
        )));
    };

    let node_type = value::str_opt(map, "type").ok_or_else(|| {
        EngineError::handler(format!("operation {index} is missing `type`"))
    })?;

    let mut node = Node::new(
        value::str_or(map, "id", &format!("op-{index}")),
        node_type,
    );
    node.name = value::str_or(map, "name", &node.node_type);
    if let Some(parameters) = value::object(map, "parameters") {
        node.parameters = parameters.clone();
    }
    Ok(node)
}

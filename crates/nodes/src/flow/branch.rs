//! The `if` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::evaluate_bool;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

/// Evaluates the `condition` expression over the input and reports which
/// branch is taken.
///
/// The traversal gates out-edges on the reported `branch`: the edge with
/// source handle `true` when the condition held, the `false` edge
/// otherwise. Evaluation errors count as false — a broken condition routes
/// to the false branch instead of failing the run.
pub struct IfHandler;

#[async_trait]
impl NodeHandler for IfHandler {
    fn node_type(&self) -> &str {
        crate::types::IF
    }

    async fn execute(
        &self,
        node: &Node,
        mut input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;

        let condition = value::str_or(&node.parameters, "condition", "");
        let result = if condition.trim().is_empty() {
            false
        } else {
            evaluate_bool(&condition, &Value::Object(input.clone())).unwrap_or_else(|err| {
                ctx.logger
                    .warn(format!("if condition `{condition}` failed: {err}"));
                false
            })
        };

        input.insert("conditionResult".into(), json!(result));
        input.insert(
            "branch".into(),
            json!(if result { "true" } else { "false" }),
        );
        Ok(input)
    }
}

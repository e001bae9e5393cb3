//! The `code` handler: restricted-expression evaluation over the input.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::{EvalError, evaluate};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::Value;

/// Evaluates the `script` parameter with the restricted expression language
/// and merges the result into the input under `result`.
///
/// `fail(message)` inside the script raises a handler failure, which is how
/// workflow authors express "throw" without a general-purpose runtime.
pub struct CodeHandler;

#[async_trait]
impl NodeHandler for CodeHandler {
    fn node_type(&self) -> &str {
        crate::types::CODE
    }

    async fn execute(
        &self,
        node: &Node,
        mut input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;

        let script = value::str_opt(&node.parameters, "script")
            .ok_or_else(|| EngineError::handler("code node requires a `script` parameter"))?;

        let result = evaluate(&script, &Value::Object(input.clone())).map_err(|err| match err {
            EvalError::Failed(message) => EngineError::handler(message),
            other => EngineError::handler(format!("script error: {other}")),
        })?;

        input.insert("result".into(), result);
        Ok(input)
    }
}

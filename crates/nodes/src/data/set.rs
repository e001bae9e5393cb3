//! The `set` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::interpolate_value;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::Value;

/// Merges the `values` parameter into the input, interpolating every string
/// against the input (with credential fallback for `{{name}}`).
pub struct SetHandler;

#[async_trait]
impl NodeHandler for SetHandler {
    fn node_type(&self) -> &str {
        crate::types::SET
    }

    async fn execute(
        &self,
        node: &Node,
        mut input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;

        let Some(values) = value::object(&node.parameters, "values") else {
            return Ok(input);
        };

        let data = Value::Object(input.clone());
        for (key, raw) in values {
            input.insert(key.clone(), interpolate_value(raw, &data, Some(ctx)));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn merges_values_into_input() {
        let ctx = testing::context();
        let node = testing::node(crate::types::SET, json!({"values": {"x": 1}}));
        let out = SetHandler
            .execute(&node, testing::map(json!({"seed": true})), &ctx)
            .await
            .unwrap();
        assert_eq!(out.get("x"), Some(&json!(1)));
        assert_eq!(out.get("seed"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn interpolates_strings_against_input() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::SET,
            json!({"values": {"greeting": "hi ${user.name}"}}),
        );
        let out = SetHandler
            .execute(&node, testing::map(json!({"user": {"name": "ada"}})), &ctx)
            .await
            .unwrap();
        assert_eq!(out.get("greeting"), Some(&json!("hi ada")));
    }

    #[tokio::test]
    async fn overwrites_existing_keys() {
        let ctx = testing::context();
        let node = testing::node(crate::types::SET, json!({"values": {"x": "new"}}));
        let out = SetHandler
            .execute(&node, testing::map(json!({"x": "old"})), &ctx)
            .await
            .unwrap();
        assert_eq!(out.get("x"), Some(&json!("new")));
    }

    #[tokio::test]
    async fn no_values_is_a_passthrough() {
        let ctx = testing::context();
        let node = testing::node(crate::types::SET, json!({}));
        let input = testing::map(json!({"a": 1}));
        let out = SetHandler.execute(&node, input.clone(), &ctx).await.unwrap();
        assert_eq!(out, input);
    }
}

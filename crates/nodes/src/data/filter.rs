//! The `filter` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::{CombineWith, Condition, eval_conditions};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

/// Filters the list at the `items` path with the condition set.
///
/// `keepMatching=true` keeps matching items, `false` drops them. The output
/// carries `_originalCount` and `_filteredCount` alongside the filtered
/// list under `items`.
pub struct FilterHandler;

#[async_trait]
impl NodeHandler for FilterHandler {
    fn node_type(&self) -> &str {
        crate::types::FILTER
    }

    async fn execute(
        &self,
        node: &Node,
        mut input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let items_path = value::str_or(params, "items", "items");
        let keep_matching = value::bool_or(params, "keepMatching", true);
        let conditions: Vec<Condition> = match params.get("conditions") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| EngineError::handler(format!("bad `conditions`: {e}")))?,
            None => Vec::new(),
        };

        let data = Value::Object(input.clone());
        let items: Vec<Value> = value::lookup_path(&data, &items_path)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let original = items.len();
        let kept: Vec<Value> = items
            .into_iter()
            .filter(|item| {
                let matched = eval_conditions(&conditions, CombineWith::And, item);
                matched == keep_matching
            })
            .collect();

        input.insert("_originalCount".into(), json!(original));
        input.insert("_filteredCount".into(), json!(kept.len()));
        input.insert("items".into(), Value::Array(kept));
        Ok(input)
    }
}

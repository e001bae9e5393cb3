//! The `sort` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::Value;
use std::cmp::Ordering;

/// Stable sort of the list at the `items` path by a dotted `field`.
///
/// Numeric when both keys are numbers (or numeric strings), lexicographic
/// otherwise. `direction` is `asc` (default) or `desc`; ties keep their
/// input order either way.
pub struct SortHandler;

#[async_trait]
impl NodeHandler for SortHandler {
    fn node_type(&self) -> &str {
        crate::types::SORT
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
        let field = value::str_or(params, "field", "");
        let descending = value::str_or(params, "direction", "asc").eq_ignore_ascii_case("desc");

        let data = Value::Object(input.clone());
        let mut items: Vec<Value> = value::lookup_path(&data, &items_path)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        items.sort_by(|a, b| {
            let ordering = compare_keys(sort_key(a, &field), sort_key(b, &field));
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        input.insert("items".into(), Value::Array(items));
        Ok(input)
    }
}

fn sort_key<'a>(item: &'a Value, field: &str) -> Option<&'a Value> {
    if field.is_empty() {
        Some(item)
    } else {
        value::lookup_path(item, field)
    }
}

fn compare_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        // Missing keys sort last so real values stay at the front.
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            } else {
                value::render(a).cmp(&value::render(b))
            }
        }
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

//! The `switch` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::{CombineWith, Condition, eval_conditions};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde::Deserialize;
use serde_json::{Value, json};

/// One switch rule: a named branch guarded by conditions.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// Branch (source handle) name this rule routes to.
    pub name: String,
    /// The guard conditions.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// How the conditions combine.
    #[serde(default, rename = "combineWith")]
    pub combine_with: CombineWith,
}

/// Routes to the first rule whose conditions hold, in declaration order;
/// falls back to `fallbackOutput` (default `fallback`) when none match.
///
/// The traversal gates out-edges on `_branch`.
pub struct SwitchHandler;

#[async_trait]
impl NodeHandler for SwitchHandler {
    fn node_type(&self) -> &str {
        crate::types::SWITCH
    }

    async fn execute(
        &self,
        node: &Node,
        mut input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let rules: Vec<Rule> = match params.get("rules") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| EngineError::handler(format!("bad `rules`: {e}")))?,
            None => Vec::new(),
        };
        let fallback = value::str_or(params, "fallbackOutput", "fallback");

        let data = Value::Object(input.clone());
        let matched = rules
            .iter()
            .enumerate()
            .find(|(_, rule)| eval_conditions(&rule.conditions, rule.combine_with, &data));

        match matched {
            Some((index, rule)) => {
                input.insert("_branch".into(), json!(rule.name));
                input.insert("_matchedRuleIndex".into(), json!(index));
                input.insert("_matched".into(), json!(true));
            }
            None => {
                input.insert("_branch".into(), json!(fallback));
                input.insert("_matchedRuleIndex".into(), json!(-1));
                input.insert("_matched".into(), json!(false));
            }
        }
        Ok(input)
    }
}

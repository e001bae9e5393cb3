//! The `subworkflow` handler.

use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_execution::ExecutionStatus;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

/// Invokes another workflow through the [`SubExecutor`] port.
///
/// The target is resolved by `workflowId`, then by `workflowName`. The full
/// ancestor chain on the context guards against recursion — a workflow may
/// not invoke itself or any workflow above it, however deep the nesting.
///
/// `inputMapping` / `outputMapping` are `target-key → source` maps where a
/// string source of the form `$.path` selects from the parent input (resp.
/// the child output) and anything else is a literal; an empty mapping
/// passes the payload through whole.
///
/// A child run that *fails* is surfaced as `{success: false, error,
/// output: {}}` — the parent does not automatically fail. Timeouts raise
/// `Timeout`; `waitForCompletion=false` starts the child and returns
/// `{async: true, …}` immediately.
///
/// [`SubExecutor`]: conflux_handler::SubExecutor
pub struct SubworkflowHandler;

#[async_trait]
impl NodeHandler for SubworkflowHandler {
    fn node_type(&self) -> &str {
        crate::types::SUBWORKFLOW
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let by_id = value::str_opt(params, "workflowId");
        let by_name = value::str_opt(params, "workflowName");
        if by_id.is_none() && by_name.is_none() {
            return Err(EngineError::handler(
                "subworkflow requires `workflowId` or `workflowName`",
            ));
        }

        let sub = ctx
            .sub_executor()
            .ok_or_else(|| EngineError::handler("no sub-executor available in this context"))?
            .clone();

        let resolved = sub
            .resolve_workflow(by_id.as_deref(), by_name.as_deref())
            .await?;
        let Some((target_id, target_name)) = resolved else {
            return Err(EngineError::WorkflowNotFound(
                by_id.or(by_name).unwrap_or_default(),
            ));
        };

        if ctx.is_ancestor(&target_id) {
            return Err(EngineError::Recursion {
                workflow_id: target_id,
            });
        }

        let sub_input = apply_mapping(
            value::object(params, "inputMapping"),
            &Value::Object(input.clone()),
        );

        let wait = value::bool_or(params, "waitForCompletion", true);
        if !wait {
            let execution_id = sub.spawn_child(&target_id, sub_input, ctx).await?;
            let mut output = JsonMap::new();
            output.insert("async".into(), json!(true));
            output.insert("workflowId".into(), json!(target_id));
            output.insert("workflowName".into(), json!(target_name));
            output.insert("executionId".into(), json!(execution_id));
            return Ok(output);
        }

        let timeout_ms = value::u64_or(params, "timeout", 300_000);
        let child = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            sub.execute_child(&target_id, sub_input, ctx),
        )
        .await
        .map_err(|_| EngineError::timeout(format!("subworkflow `{target_name}`"), timeout_ms))?;

        let mut output = JsonMap::new();
        output.insert("workflowId".into(), json!(target_id));
        output.insert("workflowName".into(), json!(target_name));

        match child {
            Ok(execution) => {
                output.insert("executionId".into(), json!(execution.id));
                output.insert("status".into(), json!(execution.status.to_string()));
                if execution.status == ExecutionStatus::Success {
                    let mapped = apply_mapping(
                        value::object(params, "outputMapping"),
                        &Value::Object(execution.output),
                    );
                    value::merge_shallow(&mut output, &mapped);
                    output.insert("success".into(), json!(true));
                } else {
                    output.insert("success".into(), json!(false));
                    output.insert(
                        "error".into(),
                        json!(
                            execution
                                .error_message
                                .unwrap_or_else(|| execution.status.to_string())
                        ),
                    );
                    output.insert("output".into(), json!({}));
                }
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                output.insert("success".into(), json!(false));
                output.insert("error".into(), json!(err.to_string()));
                output.insert("output".into(), json!({}));
            }
        }
        Ok(output)
    }
}

/// Apply a `target-key → source` mapping. `$.path` sources select from
/// `data`; everything else is literal. No mapping (or an empty one) passes
/// `data` through when it is an object.
fn apply_mapping(mapping: Option<&JsonMap>, data: &Value) -> JsonMap {
    let passthrough = || match data {
        Value::Object(map) => map.clone(),
        _ => JsonMap::new(),
    };

    let Some(mapping) = mapping else {
        return passthrough();
    };
    if mapping.is_empty() {
        return passthrough();
    }

    let mut out = JsonMap::new();
    for (target, source) in mapping {
        let resolved = match source {
            Value::String(s) if s.starts_with("$.") => value::lookup_path(data, &s[2..])
                .cloned()
                .unwrap_or(Value::Null),
            other => other.clone(),
        };
        out.insert(target.clone(), resolved);
    }
    out
}

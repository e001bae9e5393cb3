//! The `tryCatch` handler.

use async_trait::async_trait;
use chrono::Utc;
use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

use crate::ops::run_operations;

/// Runs `tryOperations`, absorbing failures into a variable and running
/// `catchOperations`, with `finallyOperations` always executed last.
///
/// The captured error object is `{ message, type, timestamp }` stored under
/// `errorVariable` (default `error`). Errors inside catch or finally are
/// surfaced as `catchError` / `finallyError` rather than replacing the
/// original. With `continueOnError=false` the handler re-fails with the
/// original error after finally has run. Cancellation is never absorbed.
pub struct TryCatchHandler;

#[async_trait]
impl NodeHandler for TryCatchHandler {
    fn node_type(&self) -> &str {
        crate::types::TRY_CATCH
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let try_ops = ops_param(params, "tryOperations");
        let catch_ops = ops_param(params, "catchOperations");
        let finally_ops = ops_param(params, "finallyOperations");
        let error_variable = value::str_or(params, "errorVariable", "error");
        let continue_on_error = value::bool_or(params, "continueOnError", true);
        let log_errors = value::bool_or(params, "logErrors", true);

        let mut original_error: Option<EngineError> = None;
        let mut catch_error: Option<String> = None;
        let mut finally_error: Option<String> = None;

        let mut current = match run_operations(&try_ops, input.clone(), ctx).await {
            Ok(out) => out,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                if log_errors {
                    ctx.logger
                        .error(format!("tryCatch caught {}: {err}", err.kind()));
                }

                let mut catch_input = input;
                catch_input.insert(
                    error_variable.clone(),
                    json!({
                        "message": err.to_string(),
                        "type": err.kind(),
                        "timestamp": Utc::now().to_rfc3339(),
                    }),
                );
                original_error = Some(err);

                match run_operations(&catch_ops, catch_input.clone(), ctx).await {
                    Ok(out) => out,
                    Err(err) if err.is_cancelled() => return Err(err),
                    Err(err) => {
                        catch_error = Some(err.to_string());
                        catch_input
                    }
                }
            }
        };

        let succeeded = original_error.is_none();

        if !finally_ops.is_empty() {
            let mut finally_input = current.clone();
            finally_input.insert("_success".into(), json!(succeeded));
            finally_input.insert("_hadError".into(), json!(!succeeded));

            match run_operations(&finally_ops, finally_input, ctx).await {
                Ok(out) => current = out,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => finally_error = Some(err.to_string()),
            }
        }

        if !continue_on_error {
            if let Some(err) = original_error {
                return Err(err);
            }
        }

        current.insert("_tryCatchSuccess".into(), json!(succeeded));
        current.insert("_tryCatchExecuted".into(), json!(true));
        if let Some(message) = catch_error {
            current.insert("catchError".into(), json!(message));
        }
        if let Some(message) = finally_error {
            current.insert("finallyError".into(), json!(message));
        }
        Ok(current)
    }
}

fn ops_param(params: &JsonMap, key: &str) -> Vec<Value> {
    value::array(params, key).cloned().unwrap_or_default()
}

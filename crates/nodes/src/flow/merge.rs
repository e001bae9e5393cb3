//! The `merge` handler.

use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};
use tokio::time::Instant;

/// Coordinates multiple upstream branches.
///
/// The traversal starts a merge on its *first* delivery and routes every
/// later delivery through the execution's [`MergeHub`] slot for this node;
/// the handler drains that slot until it has what its mode needs:
///
/// - `waitAny` — the first delivery wins; later ones are discarded.
/// - `waitAll` — collect `inputCount` deliveries, shallow-merged in arrival
///   order; on timeout, produce what arrived with `_timedOut: true`.
/// - `append` — like `waitAll`, but the deliveries become a list under
///   `outputKey`.
/// - `merge` — like `waitAll`, but the shallow-merged map sits under
///   `outputKey`.
///
/// Cancellation produces what arrived with `_interrupted: true`; the run
/// still terminates cancelled because the engine never swallows the token.
///
/// [`MergeHub`]: conflux_handler::MergeHub
pub struct MergeHandler;

#[async_trait]
impl NodeHandler for MergeHandler {
    fn node_type(&self) -> &str {
        crate::types::MERGE
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let mode = value::str_or(params, "mode", "waitAll");
        let expected = value::i64_or(params, "inputCount", 2).max(1) as usize;
        let timeout_secs = value::f64_or(params, "timeout", 300.0).max(0.0);
        let output_key = value::str_or(params, "outputKey", "merged");

        let mut received = vec![input];
        let mut timed_out = false;
        let mut interrupted = false;

        if mode != "waitAny" && expected > 1 {
            // The traversal opened this slot before invoking us; without it
            // (a merge embedded in an operations body) there is nothing to
            // wait for and we produce from the single input.
            if let Some(mut rx) = ctx.merges().take_receiver(&node.id) {
                let deadline = Instant::now() + Duration::from_secs_f64(timeout_secs);
                while received.len() < expected {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        timed_out = true;
                        break;
                    }
                    tokio::select! {
                        () = ctx.cancellation.cancelled() => {
                            interrupted = true;
                            break;
                        }
                        delivery = tokio::time::timeout(remaining, rx.recv()) => {
                            match delivery {
                                Ok(Some(payload)) => received.push(payload),
                                // Channel closed: no further deliveries can come.
                                Ok(None) => {
                                    timed_out = received.len() < expected;
                                    break;
                                }
                                Err(_) => {
                                    timed_out = true;
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut output = match mode.as_str() {
            "append" => {
                let mut map = JsonMap::new();
                map.insert(
                    output_key,
                    Value::Array(received.iter().cloned().map(Value::Object).collect()),
                );
                map
            }
            "merge" => {
                let mut merged = JsonMap::new();
                for delivery in &received {
                    value::merge_shallow(&mut merged, delivery);
                }
                let mut map = JsonMap::new();
                map.insert(output_key, Value::Object(merged));
                map
            }
            // waitAll and waitAny merge deliveries at the top level.
            _ => {
                let mut merged = JsonMap::new();
                for delivery in &received {
                    value::merge_shallow(&mut merged, delivery);
                }
                merged
            }
        };

        output.insert("_mode".into(), json!(mode));
        output.insert("_inputsReceived".into(), json!(received.len()));
        output.insert("_inputsExpected".into(), json!(expected));
        if timed_out {
            output.insert("_timedOut".into(), json!(true));
        }
        if interrupted {
            output.insert("_interrupted".into(), json!(true));
        }
        Ok(output)
    }
}

//! The `loop` handler: sequential iteration and batched parallel fan-out.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};
use tokio::task::JoinSet;

use crate::ops::run_operations;

/// Runs the embedded `operations` body once per item.
///
/// `items` is either a literal list or a dotted path into the input. Each
/// body invocation sees `{ item, index, total }` as its input; outputs are
/// collected under `results` in item order.
///
/// Parallel mode partitions items into `batchSize` batches. Within a batch
/// the bodies run concurrently under a child cancellation token: the first
/// body failure cancels the batch's remaining siblings, the collected
/// results are discarded, and the loop fails with that error. Batches run
/// sequentially. Cancelling the outer execution cancels in-flight bodies.
pub struct LoopHandler;

#[async_trait]
impl NodeHandler for LoopHandler {
    fn node_type(&self) -> &str {
        crate::types::LOOP
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let items = resolve_items(params, &input);
        let parallel = value::bool_or(params, "parallel", false);
        let batch_size = value::i64_or(params, "batchSize", 10).max(1) as usize;
        let operations: Vec<Value> = value::array(params, "operations")
            .cloned()
            .unwrap_or_default();

        let total = items.len();
        let results = if total == 0 {
            Vec::new()
        } else if parallel {
            run_parallel(&items, &operations, batch_size, ctx).await?
        } else {
            run_sequential(&items, &operations, ctx).await?
        };

        let mut output = input;
        output.insert("results".into(), Value::Array(results));
        output.insert("count".into(), json!(total));
        Ok(output)
    }
}

fn resolve_items(params: &JsonMap, input: &JsonMap) -> Vec<Value> {
    match params.get("items") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(path)) => {
            value::lookup_path(&Value::Object(input.clone()), path)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn item_input(item: &Value, index: usize, total: usize) -> JsonMap {
    let mut map = JsonMap::new();
    map.insert("item".into(), item.clone());
    map.insert("index".into(), json!(index));
    map.insert("total".into(), json!(total));
    map
}

async fn run_sequential(
    items: &[Value],
    operations: &[Value],
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, EngineError> {
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    for (index, item) in items.iter().enumerate() {
        ctx.check_cancelled()?;
        let out = run_operations(operations, item_input(item, index, total), ctx).await?;
        results.push(Value::Object(out));
    }
    Ok(results)
}

async fn run_parallel(
    items: &[Value],
    operations: &[Value],
    batch_size: usize,
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, EngineError> {
    let total = items.len();
    let mut results: Vec<Option<Value>> = vec![None; total];

    for (batch_index, batch) in items.chunks(batch_size).enumerate() {
        ctx.check_cancelled()?;

        // One scope per batch: the child token lets a failing sibling (or
        // the outer execution) stop the rest of the batch.
        let scope = ctx.cancellation.child_token();
        let scoped_ctx = ctx.clone().with_cancellation(scope.clone());
        let base = batch_index * batch_size;

        let mut tasks: JoinSet<(usize, Result<JsonMap, EngineError>)> = JoinSet::new();
        for (offset, item) in batch.iter().enumerate() {
            let index = base + offset;
            let body_ctx = scoped_ctx.clone();
            let body_ops = operations.to_vec();
            let body_input = item_input(item, index, total);
            tasks.spawn(async move {
                (index, run_operations(&body_ops, body_input, &body_ctx).await)
            });
        }

        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(out))) => {
                    results[index] = Some(Value::Object(out));
                }
                Ok((_, Err(err))) => {
                    if first_error.is_none() {
                        // Outer cancellation surfaces as Cancelled; keep it.
                        scope.cancel();
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        scope.cancel();
                        first_error = Some(EngineError::handler(format!(
                            "loop body task failed: {join_err}"
                        )));
                    }
                }
            }
        }

        if let Some(err) = first_error {
            // Collected results are discarded with the loop failure.
            return Err(err);
        }
        if ctx.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
    }

    Ok(results
        .into_iter()
        .map(|slot| slot.unwrap_or(Value::Null))
        .collect())
}

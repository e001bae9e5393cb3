//! End-to-end engine scenarios over the in-memory stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap};
use conflux_engine::Executor;
use conflux_execution::{ExecutionStatus, NodeStatus, TriggerType};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_log::{LogCategory, LogLevel, MemorySink};
use conflux_storage::MemoryWorkflowStore;
use conflux_workflow::{Edge, Node, Workflow};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn map(v: Value) -> JsonMap {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

fn node(id: &str, node_type: &str, parameters: Value) -> Node {
    Node::new(id, node_type).with_parameters(map(parameters))
}

fn workflow(id: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
    let mut wf = Workflow::new(id, id);
    wf.nodes = nodes;
    wf.edges = edges;
    wf
}

/// Sleeps for `ms`, honoring cancellation.
struct SlowHandler;

#[async_trait]
impl NodeHandler for SlowHandler {
    fn node_type(&self) -> &str {
        "slow"
    }

    async fn execute(
        &self,
        node: &Node,
        mut input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        let ms = conflux_core::value::u64_or(&node.parameters, "ms", 1_000);
        tokio::select! {
            () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
            () = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }
        input.insert("slept".into(), json!(ms));
        Ok(input)
    }
}

/// Fails the first `fail_first` calls with a transient error.
struct FlakyHandler {
    calls: AtomicUsize,
    fail_first: usize,
}

#[async_trait]
impl NodeHandler for FlakyHandler {
    fn node_type(&self) -> &str {
        "flaky"
    }

    async fn execute(
        &self,
        _node: &Node,
        mut input: JsonMap,
        _ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(EngineError::External {
                status: 503,
                detail: "transient".into(),
            })
        } else {
            input.insert("ok".into(), json!(true));
            Ok(input)
        }
    }
}

struct Harness {
    executor: Executor,
    workflows: Arc<MemoryWorkflowStore>,
    log: Arc<MemorySink>,
}

fn harness_with(extra: Vec<Arc<dyn NodeHandler>>) -> Harness {
    let workflows = Arc::new(MemoryWorkflowStore::new());
    let log = Arc::new(MemorySink::new(4096, LogLevel::Trace));
    let mut registry = conflux_engine::default_registry();
    registry.register_all(extra);
    let executor = Executor::builder()
        .workflows(workflows.clone())
        .registry(registry)
        .without_console_sink()
        .sink(log.clone())
        .build();
    Harness {
        executor,
        workflows,
        log,
    }
}

fn harness() -> Harness {
    harness_with(Vec::new())
}

// ---------------------------------------------------------------------------
// Scenario 1: linear pass-through

#[tokio::test]
async fn linear_pass_through() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-linear",
        vec![
            node("t", "manualTrigger", json!({})),
            node("s", "set", json!({"values": {"x": 1}})),
        ],
        vec![Edge::new("e1", "t", "s")],
    ));

    let execution = h.executor.execute("wf-linear", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(execution.finished_at.is_some());
    assert_eq!(execution.node_executions.len(), 2);

    let set_row = execution.node_execution("s").unwrap();
    assert_eq!(set_row.status, NodeStatus::Success);
    assert_eq!(set_row.output.get("x"), Some(&json!(1)));
    // The set node is the leaf, so its output is the run's output.
    assert_eq!(execution.output.get("x"), Some(&json!(1)));
}

// ---------------------------------------------------------------------------
// Scenario 2: if branching with skip cascade

#[tokio::test]
async fn if_branching_skips_the_untaken_branch() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-if",
        vec![
            node("t", "manualTrigger", json!({})),
            node("cond", "if", json!({"condition": "a > 10"})),
            node("yes", "set", json!({"values": {"took": "true"}})),
            node("no", "set", json!({"values": {"took": "false"}})),
        ],
        vec![
            Edge::new("e1", "t", "cond"),
            Edge::from_handle("e2", "cond", "true", "yes"),
            Edge::from_handle("e3", "cond", "false", "no"),
        ],
    ));

    let execution = h
        .executor
        .execute("wf-if", map(json!({"a": 5})))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);

    let cond_row = execution.node_execution("cond").unwrap();
    assert_eq!(cond_row.output.get("conditionResult"), Some(&json!(false)));

    let yes_row = execution.node_execution("yes").unwrap();
    assert_eq!(yes_row.status, NodeStatus::Skipped);
    assert!(yes_row.output.is_empty());

    let no_row = execution.node_execution("no").unwrap();
    assert_eq!(no_row.status, NodeStatus::Success);
    assert_eq!(no_row.output.get("took"), Some(&json!("false")));
}

#[tokio::test]
async fn skip_cascades_through_downstream_nodes() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-cascade",
        vec![
            node("t", "manualTrigger", json!({})),
            node("cond", "if", json!({"condition": "false"})),
            node("a", "set", json!({})),
            node("b", "set", json!({})),
            node("taken", "set", json!({})),
        ],
        vec![
            Edge::new("e1", "t", "cond"),
            Edge::from_handle("e2", "cond", "true", "a"),
            Edge::new("e3", "a", "b"),
            Edge::from_handle("e4", "cond", "false", "taken"),
        ],
    ));

    let execution = h.executor.execute("wf-cascade", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(
        execution.node_execution("a").unwrap().status,
        NodeStatus::Skipped
    );
    assert_eq!(
        execution.node_execution("b").unwrap().status,
        NodeStatus::Skipped
    );
    assert_eq!(
        execution.node_execution("taken").unwrap().status,
        NodeStatus::Success
    );
}

// ---------------------------------------------------------------------------
// Scenario 3: parallel loop failure

#[tokio::test]
async fn parallel_loop_failure_fails_the_run() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-loop",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "fanout",
                "loop",
                json!({
                    "items": [1, 2, 3, 4, 5, 6, 7, 8],
                    "parallel": true,
                    "batchSize": 4,
                    "operations": [{
                        "type": "code",
                        "parameters": {"script": "if(item == 5, fail('item==5'), item * 10)"},
                    }],
                }),
            ),
        ],
        vec![Edge::new("e1", "t", "fanout")],
    ));

    let execution = h.executor.execute("wf-loop", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.as_deref().unwrap().contains("item==5"));
    let loop_row = execution.node_execution("fanout").unwrap();
    assert_eq!(loop_row.status, NodeStatus::Failed);
}

#[tokio::test]
async fn sequential_loop_collects_results() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-loop-ok",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "each",
                "loop",
                json!({
                    "items": [1, 2, 3],
                    "operations": [{
                        "type": "code",
                        "parameters": {"script": "item + 100"},
                    }],
                }),
            ),
        ],
        vec![Edge::new("e1", "t", "each")],
    ));

    let execution = h.executor.execute("wf-loop-ok", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let results = execution.output.get("results").and_then(Value::as_array).unwrap();
    let values: Vec<i64> = results
        .iter()
        .map(|r| r.get("result").and_then(Value::as_i64).unwrap())
        .collect();
    assert_eq!(values, vec![101, 102, 103]);
}

// ---------------------------------------------------------------------------
// Scenario 4: retry then succeed

#[tokio::test]
async fn retry_masks_transient_failures() {
    let flaky = Arc::new(FlakyHandler {
        calls: AtomicUsize::new(0),
        fail_first: 2,
    });
    let h = harness_with(vec![flaky.clone()]);
    h.workflows.upsert(workflow(
        "wf-retry",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "r",
                "retry",
                json!({
                    "maxRetries": 3,
                    "backoffStrategy": "fixed",
                    "initialDelayMs": 0,
                    "operations": [{"type": "flaky"}],
                }),
            ),
        ],
        vec![Edge::new("e1", "t", "r")],
    ));

    let execution = h.executor.execute("wf-retry", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let retry_row = execution.node_execution("r").unwrap();
    assert_eq!(retry_row.output.get("success"), Some(&json!(true)));
    assert_eq!(retry_row.output.get("attemptCount"), Some(&json!(3)));
    assert_eq!(retry_row.output.get("totalDelayMs"), Some(&json!(0)));
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

// ---------------------------------------------------------------------------
// Scenario 5: rate-limit throttling

#[tokio::test]
async fn rate_limit_throttles_burst() {
    let h = harness();
    let bucket = format!("burst-{}", uuid::Uuid::new_v4());
    h.workflows.upsert(workflow(
        "wf-limit",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "gate",
                "rate_limit",
                json!({
                    "bucketId": bucket,
                    "tokensPerSecond": 2,
                    "maxTokens": 2,
                    "tokensPerRequest": 1,
                    "waitForTokens": false,
                    "operations": [],
                }),
            ),
        ],
        vec![Edge::new("e1", "t", "gate")],
    ));

    let mut granted = 0;
    let mut throttled = 0;
    for _ in 0..5 {
        let execution = h.executor.execute("wf-limit", JsonMap::new()).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Success);
        let out = &execution.node_execution("gate").unwrap().output;
        if out.get("success") == Some(&json!(true)) {
            assert_eq!(out.get("throttled"), Some(&json!(false)));
            granted += 1;
        } else {
            assert_eq!(out.get("throttled"), Some(&json!(true)));
            throttled += 1;
        }
    }

    assert_eq!(granted, 2);
    assert_eq!(throttled, 3);
}

// ---------------------------------------------------------------------------
// Scenario 6: merge waitAll timeout

#[tokio::test(start_paused = true)]
async fn merge_wait_all_times_out_on_slow_branch() {
    let h = harness_with(vec![Arc::new(SlowHandler)]);
    h.workflows.upsert(workflow(
        "wf-merge-timeout",
        vec![
            node("t", "manualTrigger", json!({})),
            node("fast", "set", json!({"values": {"fast": true}})),
            node("slowpoke", "slow", json!({"ms": 5000})),
            node(
                "join",
                "merge",
                json!({"mode": "waitAll", "inputCount": 2, "timeout": 1}),
            ),
        ],
        vec![
            Edge::new("e1", "t", "fast"),
            Edge::new("e2", "t", "slowpoke"),
            Edge::new("e3", "fast", "join"),
            Edge::new("e4", "slowpoke", "join"),
        ],
    ));

    let execution = h
        .executor
        .execute("wf-merge-timeout", JsonMap::new())
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let join_row = execution.node_execution("join").unwrap();
    assert_eq!(join_row.output.get("fast"), Some(&json!(true)));
    assert!(!join_row.output.contains_key("slept"));
    assert_eq!(join_row.output.get("_timedOut"), Some(&json!(true)));
    assert_eq!(join_row.output.get("_inputsReceived"), Some(&json!(1)));
    assert_eq!(join_row.output.get("_inputsExpected"), Some(&json!(2)));

    // Exactly one merge row despite two upstream deliveries.
    let merge_rows = execution
        .node_executions
        .iter()
        .filter(|r| r.node_id == "join")
        .count();
    assert_eq!(merge_rows, 1);
}

#[tokio::test]
async fn merge_wait_all_joins_both_branches() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-merge",
        vec![
            node("t", "manualTrigger", json!({})),
            node("a", "set", json!({"values": {"a": 1}})),
            node("b", "set", json!({"values": {"b": 2}})),
            node(
                "join",
                "merge",
                json!({"mode": "waitAll", "inputCount": 2, "timeout": 30}),
            ),
        ],
        vec![
            Edge::new("e1", "t", "a"),
            Edge::new("e2", "t", "b"),
            Edge::new("e3", "a", "join"),
            Edge::new("e4", "b", "join"),
        ],
    ));

    let execution = h.executor.execute("wf-merge", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let join_row = execution.node_execution("join").unwrap();
    assert_eq!(join_row.output.get("a"), Some(&json!(1)));
    assert_eq!(join_row.output.get("b"), Some(&json!(2)));
    assert_eq!(join_row.output.get("_inputsReceived"), Some(&json!(2)));
}

// ---------------------------------------------------------------------------
// Cancellation

#[tokio::test(start_paused = true)]
async fn cancel_before_any_handler_yields_zero_rows() {
    let h = harness_with(vec![Arc::new(SlowHandler)]);
    h.workflows.upsert(workflow(
        "wf-cancel-early",
        vec![
            node("t", "manualTrigger", json!({})),
            node("s", "slow", json!({"ms": 10_000})),
        ],
        vec![Edge::new("e1", "t", "s")],
    ));

    // On the paused current-thread runtime the spawned drive task has not
    // been polled yet, so cancellation lands before any handler starts.
    let handle = h
        .executor
        .execute_async("wf-cancel-early", JsonMap::new())
        .await
        .unwrap();
    handle.cancel();
    let execution = handle.await_result().await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert_eq!(execution.node_executions.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_run_aborts_inflight_handlers() {
    let h = harness_with(vec![Arc::new(SlowHandler)]);
    h.workflows.upsert(workflow(
        "wf-cancel-mid",
        vec![
            node("t", "manualTrigger", json!({})),
            node("s", "slow", json!({"ms": 60_000})),
            node("after", "set", json!({"values": {"reached": true}})),
        ],
        vec![Edge::new("e1", "t", "s"), Edge::new("e2", "s", "after")],
    ));

    let handle = h
        .executor
        .execute_async("wf-cancel-mid", JsonMap::new())
        .await
        .unwrap();
    let execution_id = handle.execution_id().to_string();

    // Let the trigger finish and the slow node start sleeping.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.executor.cancel(&execution_id));
    let execution = handle.await_result().await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    let slow_row = execution.node_execution("s").unwrap();
    assert_eq!(slow_row.status, NodeStatus::Failed);
    assert!(
        slow_row
            .error_message
            .as_deref()
            .unwrap()
            .contains("cancelled")
    );
    assert!(execution.node_execution("after").is_none());
}

// ---------------------------------------------------------------------------
// Timeouts

#[tokio::test(start_paused = true)]
async fn overall_timeout_fails_the_run() {
    let h = harness_with(vec![Arc::new(SlowHandler)]);
    let mut wf = workflow(
        "wf-timeout",
        vec![
            node("t", "manualTrigger", json!({})),
            node("s", "slow", json!({"ms": 60_000})),
        ],
        vec![Edge::new("e1", "t", "s")],
    );
    wf.settings.insert("timeout".into(), json!(1));
    h.workflows.upsert(wf);

    let execution = h.executor.execute("wf-timeout", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.as_deref().unwrap().contains("timeout"));
}

// ---------------------------------------------------------------------------
// Failure surfacing

#[tokio::test]
async fn unknown_node_type_fails_the_run() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-unknown",
        vec![
            node("t", "manualTrigger", json!({})),
            node("x", "frobnicate", json!({})),
        ],
        vec![Edge::new("e1", "t", "x")],
    ));

    let execution = h.executor.execute("wf-unknown", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(
        execution
            .error_message
            .as_deref()
            .unwrap()
            .contains("unknown node type")
    );
}

#[tokio::test]
async fn cyclic_workflow_is_rejected_before_running() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-cycle",
        vec![
            node("t", "manualTrigger", json!({})),
            node("a", "set", json!({})),
            node("b", "set", json!({})),
        ],
        vec![
            Edge::new("e1", "t", "a"),
            Edge::new("e2", "a", "b"),
            Edge::new("e3", "b", "a"),
        ],
    ));

    let err = h.executor.execute("wf-cycle", JsonMap::new()).await.unwrap_err();
    assert_eq!(err.kind(), "invalidWorkflow");
}

#[tokio::test]
async fn missing_workflow_is_not_found() {
    let h = harness();
    let err = h.executor.execute("wf-ghost", JsonMap::new()).await.unwrap_err();
    assert_eq!(err.kind(), "notFound");
}

#[tokio::test]
async fn try_catch_absorbs_downstream_failure() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-trycatch",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "guard",
                "tryCatch",
                json!({
                    "tryOperations": [{
                        "type": "code",
                        "parameters": {"script": "fail('inner boom')"},
                    }],
                    "catchOperations": [{
                        "type": "set",
                        "parameters": {"values": {"recovered": true}},
                    }],
                }),
            ),
        ],
        vec![Edge::new("e1", "t", "guard")],
    ));

    let execution = h.executor.execute("wf-trycatch", JsonMap::new()).await.unwrap();

    // The failure was absorbed; the run succeeds.
    assert_eq!(execution.status, ExecutionStatus::Success);
    let row = execution.node_execution("guard").unwrap();
    assert_eq!(row.output.get("_tryCatchSuccess"), Some(&json!(false)));
    assert_eq!(row.output.get("recovered"), Some(&json!(true)));
}

// ---------------------------------------------------------------------------
// Switch routing

#[tokio::test]
async fn switch_routes_to_named_branch() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-switch",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "route",
                "switch",
                json!({
                    "rules": [
                        {
                            "name": "big",
                            "conditions": [{"field": "n", "operator": "gt", "value": 100}],
                        },
                        {
                            "name": "small",
                            "conditions": [{"field": "n", "operator": "lte", "value": 100}],
                        },
                    ],
                }),
            ),
            node("big", "set", json!({"values": {"size": "big"}})),
            node("small", "set", json!({"values": {"size": "small"}})),
            node("neither", "set", json!({"values": {"size": "?"}})),
        ],
        vec![
            Edge::new("e1", "t", "route"),
            Edge::from_handle("e2", "route", "big", "big"),
            Edge::from_handle("e3", "route", "small", "small"),
            Edge::from_handle("e4", "route", "fallback", "neither"),
        ],
    ));

    let execution = h
        .executor
        .execute("wf-switch", map(json!({"n": 7})))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(
        execution.node_execution("small").unwrap().status,
        NodeStatus::Success
    );
    assert_eq!(
        execution.node_execution("big").unwrap().status,
        NodeStatus::Skipped
    );
    assert_eq!(
        execution.node_execution("neither").unwrap().status,
        NodeStatus::Skipped
    );
}

// ---------------------------------------------------------------------------
// Subworkflows

#[tokio::test]
async fn subworkflow_runs_and_maps_output() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-child",
        vec![
            node("ct", "manualTrigger", json!({})),
            node("cs", "set", json!({"values": {"total": 42}})),
        ],
        vec![Edge::new("e1", "ct", "cs")],
    ));
    h.workflows.upsert(workflow(
        "wf-parent",
        vec![
            node("t", "manualTrigger", json!({})),
            node(
                "call",
                "subworkflow",
                json!({
                    "workflowName": "wf-child",
                    "outputMapping": {"grandTotal": "$.total"},
                }),
            ),
        ],
        vec![Edge::new("e1", "t", "call")],
    ));

    let execution = h.executor.execute("wf-parent", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let call_row = execution.node_execution("call").unwrap();
    assert_eq!(call_row.output.get("success"), Some(&json!(true)));
    assert_eq!(call_row.output.get("grandTotal"), Some(&json!(42)));

    // The child run is recorded with the subworkflow trigger.
    let child_runs = h.executor.find_by_workflow_id("wf-child").await.unwrap();
    assert_eq!(child_runs.len(), 1);
    assert_eq!(child_runs[0].trigger_type, TriggerType::Subworkflow);
    assert_eq!(child_runs[0].status, ExecutionStatus::Success);
}

#[tokio::test]
async fn recursive_subworkflow_fails_without_nesting() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-selfcall",
        vec![
            node("t", "manualTrigger", json!({})),
            node("call", "subworkflow", json!({"workflowId": "wf-selfcall"})),
        ],
        vec![Edge::new("e1", "t", "call")],
    ));

    let execution = h.executor.execute("wf-selfcall", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(
        execution
            .error_message
            .as_deref()
            .unwrap()
            .contains("recursive")
    );
    // No nested execution was started.
    let runs = h.executor.find_by_workflow_id("wf-selfcall").await.unwrap();
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn failed_child_surfaces_without_failing_parent() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-broken-child",
        vec![
            node("ct", "manualTrigger", json!({})),
            node(
                "boom",
                "code",
                json!({"script": "fail('child exploded')"}),
            ),
        ],
        vec![Edge::new("e1", "ct", "boom")],
    ));
    h.workflows.upsert(workflow(
        "wf-tolerant-parent",
        vec![
            node("t", "manualTrigger", json!({})),
            node("call", "subworkflow", json!({"workflowId": "wf-broken-child"})),
        ],
        vec![Edge::new("e1", "t", "call")],
    ));

    let execution = h
        .executor
        .execute("wf-tolerant-parent", JsonMap::new())
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let call_row = execution.node_execution("call").unwrap();
    assert_eq!(call_row.output.get("success"), Some(&json!(false)));
    assert!(
        call_row
            .output
            .get("error")
            .and_then(Value::as_str)
            .unwrap()
            .contains("child exploded")
    );
}

// ---------------------------------------------------------------------------
// Disabled nodes and independent branches

#[tokio::test]
async fn disabled_node_passes_input_through() {
    let h = harness();
    let mut disabled = node("mid", "set", json!({"values": {"x": 99}}));
    disabled.disabled = true;
    h.workflows.upsert(workflow(
        "wf-disabled",
        vec![
            node("t", "manualTrigger", json!({})),
            disabled,
            node("end", "set", json!({"values": {"done": true}})),
        ],
        vec![Edge::new("e1", "t", "mid"), Edge::new("e2", "mid", "end")],
    ));

    let execution = h
        .executor
        .execute("wf-disabled", map(json!({"seed": 1})))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    let mid_row = execution.node_execution("mid").unwrap();
    assert_eq!(mid_row.status, NodeStatus::Success);
    // The handler never ran: `values` was not applied.
    assert!(!mid_row.output.contains_key("x"));
    assert_eq!(mid_row.output.get("seed"), Some(&json!(1)));
    assert_eq!(execution.output.get("done"), Some(&json!(true)));
}

#[tokio::test]
async fn independent_branches_both_run() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-fanout",
        vec![
            node("t", "manualTrigger", json!({})),
            node("left", "set", json!({"values": {"left": 1}})),
            node("right", "set", json!({"values": {"right": 2}})),
        ],
        vec![Edge::new("e1", "t", "left"), Edge::new("e2", "t", "right")],
    ));

    let execution = h.executor.execute("wf-fanout", JsonMap::new()).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Success);
    // Both leaves contribute to the run output.
    assert_eq!(execution.output.get("left"), Some(&json!(1)));
    assert_eq!(execution.output.get("right"), Some(&json!(2)));
}

// ---------------------------------------------------------------------------
// Log pipeline integration

#[tokio::test]
async fn log_pipeline_records_the_run() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-logged",
        vec![
            node("t", "manualTrigger", json!({})),
            node("s", "set", json!({"values": {"x": 1}})),
        ],
        vec![Edge::new("e1", "t", "s")],
    ));

    let execution = h.executor.execute("wf-logged", JsonMap::new()).await.unwrap();

    let entries = h.log.entries();
    let of = |category: LogCategory| {
        entries
            .iter()
            .filter(|e| e.category == category && e.execution_id == execution.id)
            .count()
    };
    assert_eq!(of(LogCategory::ExecutionStart), 1);
    assert_eq!(of(LogCategory::NodeStart), 2);
    assert_eq!(of(LogCategory::NodeEnd), 2);
    assert_eq!(of(LogCategory::ExecutionEnd), 1);
}

#[tokio::test]
async fn failures_produce_error_entries() {
    let h = harness();
    h.workflows.upsert(workflow(
        "wf-log-error",
        vec![
            node("t", "manualTrigger", json!({})),
            node("boom", "code", json!({"script": "fail('kaput')"})),
        ],
        vec![Edge::new("e1", "t", "boom")],
    ));

    let execution = h.executor.execute("wf-log-error", JsonMap::new()).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    let errors = h.log.entries_with_category(LogCategory::Error);
    assert!(!errors.is_empty());
    let entry = &errors[0];
    assert_eq!(entry.level, LogLevel::Error);
    assert_eq!(entry.context.get("nodeId"), Some(&json!("boom")));
    assert_eq!(entry.context.get("errorKind"), Some(&json!("handler")));
}

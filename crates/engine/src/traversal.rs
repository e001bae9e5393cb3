//! The graph walk: readiness, delivery, skip cascade, and completion.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use conflux_core::{EngineError, JsonMap, value};
use conflux_execution::{NodeExecution, NodeStatus};
use conflux_handler::{ExecutionContext, ExecutionStore};
use conflux_workflow::Node;
use tokio::task::JoinSet;

use crate::gating;

/// What the walk ended with; the executor maps this onto a terminal status.
pub(crate) struct Outcome {
    /// Cancellation was observed.
    pub cancelled: bool,
    /// The first unabsorbed handler (or infrastructure) error.
    pub first_error: Option<EngineError>,
    /// Shallow merge of leaf-node outputs, in completion order.
    pub output: JsonMap,
}

/// Per-node bookkeeping.
///
/// A node is *ready* when it has at least one delivery and every other
/// potential in-edge has either delivered or died; merge nodes are ready on
/// their first delivery (later ones are routed through the hub). A node
/// whose every in-edge died is skipped, and its own out-edges die in turn.
#[derive(Default)]
struct NodeState {
    expected: usize,
    deliveries: Vec<JsonMap>,
    dead: usize,
    queued: bool,
    started: bool,
    finished: bool,
    skipped: bool,
}

/// The result a spawned handler task reports back to the coordinator.
struct NodeRun {
    node_id: String,
    input: JsonMap,
    started_at: DateTime<Utc>,
    result: Result<JsonMap, EngineError>,
}

pub(crate) async fn run(
    ctx: &ExecutionContext,
    store: &Arc<dyn ExecutionStore>,
) -> Result<Outcome, EngineError> {
    Walker::new(ctx, store)?.drive().await
}

struct Walker<'a> {
    ctx: &'a ExecutionContext,
    store: &'a Arc<dyn ExecutionStore>,
    states: HashMap<String, NodeState>,
    ready: VecDeque<String>,
    completion_order: Vec<String>,
    stopping: bool,
    cancelled: bool,
    first_error: Option<EngineError>,
}

impl<'a> Walker<'a> {
    fn new(
        ctx: &'a ExecutionContext,
        store: &'a Arc<dyn ExecutionStore>,
    ) -> Result<Self, EngineError> {
        let workflow = &ctx.workflow;
        let mut states: HashMap<String, NodeState> = workflow
            .nodes
            .iter()
            .map(|node| (node.id.clone(), NodeState::default()))
            .collect();
        for edge in &workflow.edges {
            if let Some(state) = states.get_mut(&edge.target_node_id) {
                state.expected += 1;
            }
        }

        let mut walker = Self {
            ctx,
            store,
            states,
            ready: VecDeque::new(),
            completion_order: Vec::new(),
            stopping: false,
            cancelled: false,
            first_error: None,
        };

        // Frontier: trigger nodes without in-edges; workflows without
        // triggers (subworkflow bodies) start from their sourceless nodes.
        let mut entries: Vec<String> = workflow
            .trigger_nodes()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        if entries.is_empty() {
            entries = workflow
                .nodes
                .iter()
                .filter(|n| !n.disabled && workflow.in_edges(&n.id).is_empty())
                .map(|n| n.id.clone())
                .collect();
        }
        if entries.is_empty() {
            return Err(EngineError::InvalidWorkflow(
                "workflow has no start nodes".to_string(),
            ));
        }

        for entry in entries {
            let state = walker.states.get_mut(&entry).expect("known node");
            state.deliveries.push(ctx.initial_input.clone());
            state.queued = true;
            walker.ready.push_back(entry);
        }
        Ok(walker)
    }

    async fn drive(mut self) -> Result<Outcome, EngineError> {
        let mut inflight: JoinSet<NodeRun> = JoinSet::new();
        let mut task_nodes: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut aborted = false;

        loop {
            self.schedule(&mut inflight, &mut task_nodes).await;

            // After the first unabsorbed error there is nothing left to
            // schedule; abort the in-flight siblings (a merge could
            // otherwise sit in its wait for minutes) and drain them.
            if self.stopping && self.first_error.is_some() && !aborted {
                inflight.abort_all();
                aborted = true;
            }

            match inflight.join_next_with_id().await {
                Some(Ok((task_id, node_run))) => {
                    task_nodes.remove(&task_id);
                    self.process(node_run).await;
                }
                Some(Err(join_err)) => {
                    let node_id = task_nodes.remove(&join_err.id());
                    if join_err.is_cancelled() {
                        if let Some(node_id) = node_id {
                            self.record_interrupted(&node_id).await;
                        }
                    } else {
                        self.stopping = true;
                        if self.first_error.is_none() {
                            self.first_error = Some(EngineError::handler(format!(
                                "node task panicked: {join_err}"
                            )));
                        }
                        if let Some(node_id) = node_id {
                            self.record_interrupted(&node_id).await;
                        }
                    }
                }
                None => break,
            }
        }

        if self.ctx.cancellation.is_cancelled() {
            self.cancelled = true;
        }

        let output = self.leaf_output();
        Ok(Outcome {
            cancelled: self.cancelled,
            first_error: self.first_error,
            output,
        })
    }

    /// Spawn every ready node. Disabled nodes are handled inline — no
    /// handler runs, the merged input passes through all out-edges.
    async fn schedule(
        &mut self,
        inflight: &mut JoinSet<NodeRun>,
        task_nodes: &mut HashMap<tokio::task::Id, String>,
    ) {
        while let Some(node_id) = self.ready.pop_front() {
            if self.stopping || self.ctx.cancellation.is_cancelled() {
                self.stopping = true;
                continue;
            }

            let node = self
                .ctx
                .workflow
                .node(&node_id)
                .cloned()
                .expect("scheduled node exists");
            let is_merge = node.node_type == "merge";

            let (input, extras) = {
                let state = self.states.get_mut(&node_id).expect("known node");
                state.started = true;
                if is_merge {
                    // The first delivery is the handler input; anything
                    // that already arrived goes through the hub.
                    let mut deliveries = std::mem::take(&mut state.deliveries);
                    let first = deliveries.remove(0);
                    (first, deliveries)
                } else {
                    let mut merged = JsonMap::new();
                    for delivery in state.deliveries.drain(..) {
                        value::merge_shallow(&mut merged, &delivery);
                    }
                    (merged, Vec::new())
                }
            };

            if node.disabled {
                self.ctx.logger.debug(format!(
                    "node {node_id} disabled, passing input through"
                ));
                let now = Utc::now();
                self.record(&node, NodeStatus::Success, now, now, input.clone(), input.clone(), None)
                    .await;
                self.ctx.publish_node_output(&node_id, input.clone());
                self.complete(&node, &input).await;
                continue;
            }

            if is_merge {
                self.ctx.merges().open(&node_id);
                for extra in extras {
                    self.ctx.merges().deliver(&node_id, extra);
                }
            }

            let ctx = self.ctx.clone();
            let task_input = input.clone();
            let spawned_node_id = node.id.clone();
            let abort = inflight.spawn(async move {
                let started_at = Utc::now();
                ctx.logger.node_start(&node.id, &node.node_type);

                let result = match ctx.registry().get(&node.node_type) {
                    Ok(handler) => tokio::select! {
                        () = ctx.cancellation.cancelled() => Err(EngineError::Cancelled),
                        outcome = handler.execute(&node, task_input.clone(), &ctx) => outcome,
                    },
                    Err(err) => Err(err),
                };

                NodeRun {
                    node_id: node.id,
                    input: task_input,
                    started_at,
                    result,
                }
            });
            task_nodes.insert(abort.id(), spawned_node_id);
        }
    }

    /// Row for a task torn down mid-flight after an unrelated failure.
    async fn record_interrupted(&mut self, node_id: &str) {
        if let Some(state) = self.states.get_mut(node_id) {
            state.finished = true;
        }
        if let Some(node) = self.ctx.workflow.node(node_id).cloned() {
            if node.node_type == "merge" {
                self.ctx.merges().close(&node.id);
            }
            let now = Utc::now();
            self.record(
                &node,
                NodeStatus::Failed,
                now,
                now,
                JsonMap::new(),
                JsonMap::new(),
                Some("aborted after earlier failure".to_string()),
            )
            .await;
        }
    }

    async fn process(&mut self, node_run: NodeRun) {
        let node = self
            .ctx
            .workflow
            .node(&node_run.node_id)
            .cloned()
            .expect("completed node exists");

        if let Some(state) = self.states.get_mut(&node.id) {
            state.finished = true;
        }
        if node.node_type == "merge" {
            self.ctx.merges().close(&node.id);
        }

        let finished_at = Utc::now();
        match node_run.result {
            Ok(output) => {
                self.ctx.publish_node_output(&node.id, output.clone());
                self.record(
                    &node,
                    NodeStatus::Success,
                    node_run.started_at,
                    finished_at,
                    node_run.input,
                    output.clone(),
                    None,
                )
                .await;
                self.ctx.logger.node_end(
                    &node.id,
                    &node.node_type,
                    "success",
                    (finished_at - node_run.started_at).num_milliseconds().max(0) as u64,
                );
                self.complete(&node, &output).await;
            }
            Err(err) if err.is_cancelled() => {
                self.record(
                    &node,
                    NodeStatus::Failed,
                    node_run.started_at,
                    finished_at,
                    node_run.input,
                    JsonMap::new(),
                    Some("execution cancelled".to_string()),
                )
                .await;
                self.cancelled = true;
                self.stopping = true;
            }
            Err(err) => {
                self.record(
                    &node,
                    NodeStatus::Failed,
                    node_run.started_at,
                    finished_at,
                    node_run.input,
                    JsonMap::new(),
                    Some(err.to_string()),
                )
                .await;
                self.ctx
                    .logger
                    .failure(&node.id, &node.node_type, err.kind(), &err.to_string());
                if self.first_error.is_none() {
                    self.first_error = Some(err);
                }
                self.stopping = true;
            }
        }
    }

    /// Propagate a successful node's output along its gated out-edges.
    async fn complete(&mut self, node: &Node, output: &JsonMap) {
        self.completion_order.push(node.id.clone());

        let out_edges = self.ctx.workflow.out_edges(&node.id);
        let (active, gated_off) =
            gating::partition_edges(&node.node_type, node.disabled, output, &out_edges);

        let deliveries: Vec<String> = active
            .iter()
            .map(|edge| edge.target_node_id.clone())
            .collect();
        let kills: Vec<String> = gated_off
            .iter()
            .map(|edge| edge.target_node_id.clone())
            .collect();

        for target in deliveries {
            self.deliver(&target, output.clone());
        }
        for target in kills {
            self.kill_edge_into(target).await;
        }
    }

    /// Hand one delivery to a target node.
    fn deliver(&mut self, target_id: &str, payload: JsonMap) {
        let is_merge = self
            .ctx
            .workflow
            .node(target_id)
            .is_some_and(|n| n.node_type == "merge");

        let Some(state) = self.states.get_mut(target_id) else {
            return;
        };
        if state.skipped || state.finished {
            // Late delivery (a merge that already produced); discard.
            return;
        }
        if state.started {
            if is_merge {
                self.ctx.merges().deliver(target_id, payload);
            }
            return;
        }
        state.deliveries.push(payload);
        self.enqueue_if_ready(target_id);
    }

    /// One in-edge into `target` died; cascade skips through nodes that can
    /// no longer receive anything.
    async fn kill_edge_into(&mut self, target: String) {
        let mut work = vec![target];
        let mut newly_skipped = Vec::new();

        while let Some(node_id) = work.pop() {
            let Some(state) = self.states.get_mut(&node_id) else {
                continue;
            };
            state.dead += 1;
            if state.started || state.finished || state.skipped {
                continue;
            }
            if state.dead >= state.expected && state.deliveries.is_empty() {
                state.skipped = true;
                newly_skipped.push(node_id.clone());
                for edge in self.ctx.workflow.out_edges(&node_id) {
                    work.push(edge.target_node_id.clone());
                }
            } else {
                // Remaining live inputs may now be complete.
                self.enqueue_if_ready(&node_id);
            }
        }

        for node_id in newly_skipped {
            if let Some(node) = self.ctx.workflow.node(&node_id).cloned() {
                let now = Utc::now();
                self.record(
                    &node,
                    NodeStatus::Skipped,
                    now,
                    now,
                    JsonMap::new(),
                    JsonMap::new(),
                    None,
                )
                .await;
                self.ctx.logger.node_skipped(&node_id);
            }
        }
    }

    fn enqueue_if_ready(&mut self, node_id: &str) {
        let is_merge = self
            .ctx
            .workflow
            .node(node_id)
            .is_some_and(|n| n.node_type == "merge");

        let Some(state) = self.states.get_mut(node_id) else {
            return;
        };
        if state.queued || state.started || state.finished || state.skipped {
            return;
        }
        let ready = if is_merge {
            !state.deliveries.is_empty()
        } else {
            !state.deliveries.is_empty()
                && state.deliveries.len() + state.dead >= state.expected
        };
        if ready {
            state.queued = true;
            self.ready.push_back(node_id.to_string());
        }
    }

    /// Shallow merge of the outputs of leaf nodes that ran, in completion
    /// order.
    fn leaf_output(&self) -> JsonMap {
        let mut output = JsonMap::new();
        for node_id in &self.completion_order {
            if self.ctx.workflow.out_edges(node_id).is_empty() {
                if let Some(node_output) = self.ctx.node_output(node_id) {
                    value::merge_shallow(&mut output, &node_output);
                }
            }
        }
        output
    }

    async fn record(
        &self,
        node: &Node,
        status: NodeStatus,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        input: JsonMap,
        output: JsonMap,
        error_message: Option<String>,
    ) {
        let row = NodeExecution {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            node_type: node.node_type.clone(),
            status,
            started_at,
            finished_at,
            input,
            output,
            error_message,
        };
        if let Err(err) = self
            .store
            .append_node_execution(&self.ctx.execution_id, row)
            .await
        {
            tracing::warn!(
                execution_id = %self.ctx.execution_id,
                node_id = %node.id,
                error = %err,
                "failed to append node execution row"
            );
        }
    }
}

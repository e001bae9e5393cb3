//! Branch gating: which out-edges carry a node's output downstream.

use conflux_core::{JsonMap, value};
use conflux_workflow::Edge;

/// The handle a node's output activates.
///
/// - `if` routes to the handle named by `branch` (falling back to
///   `conditionResult`).
/// - `switch` routes to the handle named by `_branch`.
/// - Everything else (actions, data nodes, triggers, merge) activates
///   `main`.
fn active_handle(node_type: &str, output: &JsonMap) -> String {
    match node_type {
        "if" => value::str_opt(output, "branch")
            .unwrap_or_else(|| value::bool_or(output, "conditionResult", false).to_string()),
        "switch" => value::str_or(output, "_branch", "fallback"),
        _ => "main".to_string(),
    }
}

/// Split a node's out-edges into (active, gated-off) under its branch
/// policy. Disabled nodes activate every out-edge regardless of handle.
pub(crate) fn partition_edges<'a>(
    node_type: &str,
    disabled: bool,
    output: &JsonMap,
    out_edges: &[&'a Edge],
) -> (Vec<&'a Edge>, Vec<&'a Edge>) {
    if disabled {
        return (out_edges.to_vec(), Vec::new());
    }
    let handle = active_handle(node_type, output);
    out_edges
        .iter()
        .copied()
        .partition(|edge| edge.source_handle() == handle)
}

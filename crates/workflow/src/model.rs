//! Workflow, node, and edge descriptions.

use chrono::{DateTime, Utc};
use conflux_core::JsonMap;
use serde::{Deserialize, Serialize};

/// The handle name used when an edge does not name one.
pub const MAIN_HANDLE: &str = "main";

/// Canvas position of a node. Carried for round-tripping workflow files;
/// the engine never reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// A typed unit of work in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Opaque id, unique within the workflow.
    pub id: String,
    /// The node type tag, e.g. `httpRequest` or `manualTrigger`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Canvas position.
    #[serde(default)]
    pub position: Position,
    /// Handler parameters. May be empty, never null.
    #[serde(default)]
    pub parameters: JsonMap,
    /// Optional reference to a stored credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,
    /// Disabled nodes pass their input through without running a handler.
    #[serde(default)]
    pub disabled: bool,
    /// Free-form author notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Node {
    /// Create a node with the given id and type; everything else defaulted.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            position: Position::default(),
            parameters: JsonMap::new(),
            credential_ref: None,
            disabled: false,
            notes: None,
        }
    }

    /// Builder-style parameter assignment.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonMap) -> Self {
        self.parameters = parameters;
        self
    }

    /// Trigger nodes start executions; by convention their type ends in
    /// `Trigger`.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.node_type.ends_with("Trigger")
    }
}

/// A directed connector between two nodes.
///
/// `source_handle` names the output port the edge leaves from (`main`,
/// `true`, `false`, `fallback`, or a switch rule name); `target_handle` is
/// `main` for every current node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Opaque id.
    pub id: String,
    /// Source node id.
    pub source_node_id: String,
    /// Output port on the source node. Blank means `main`.
    #[serde(default)]
    pub source_handle: String,
    /// Target node id.
    pub target_node_id: String,
    /// Input port on the target node. Blank means `main`.
    #[serde(default)]
    pub target_handle: String,
}

impl Edge {
    /// Create a `main → main` edge.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source.into(),
            source_handle: String::new(),
            target_node_id: target.into(),
            target_handle: String::new(),
        }
    }

    /// Create an edge leaving a named output port.
    pub fn from_handle(
        id: impl Into<String>,
        source: impl Into<String>,
        handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_handle: handle.into(),
            ..Self::new(id, source, target)
        }
    }

    /// The source handle, with blank normalized to `main`.
    #[must_use]
    pub fn source_handle(&self) -> &str {
        if self.source_handle.is_empty() {
            MAIN_HANDLE
        } else {
            &self.source_handle
        }
    }

    /// The target handle, with blank normalized to `main`.
    #[must_use]
    pub fn target_handle(&self) -> &str {
        if self.target_handle.is_empty() {
            MAIN_HANDLE
        } else {
            &self.target_handle
        }
    }
}

/// A declared workflow: the graph plus its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Opaque id.
    pub id: String,
    /// Display name, unique per store.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The nodes of the graph.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// The edges of the graph.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Workflow-level settings (e.g. `timeout` in seconds).
    #[serde(default)]
    pub settings: JsonMap,
    /// Whether schedule/webhook triggers should fire for this workflow.
    #[serde(default)]
    pub active: bool,
    /// Creation timestamp.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create an empty workflow shell.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            settings: JsonMap::new(),
            active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All trigger nodes that have no incoming edges — the default
    /// execution frontier.
    #[must_use]
    pub fn trigger_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.is_trigger() && !self.edges.iter().any(|e| e.target_node_id == n.id))
            .collect()
    }

    /// Edges leaving the given node, in declaration order.
    #[must_use]
    pub fn out_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.source_node_id == node_id)
            .collect()
    }

    /// Edges entering the given node, in declaration order.
    #[must_use]
    pub fn in_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.target_node_id == node_id)
            .collect()
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::GraphId;

/// A node in the execution graph.
///
/// Each node binds one registered tool and an optional default successor.
/// The successor can be overridden at runtime by the tool's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node within its graph.
    pub id: String,
    /// Name of the registered tool this node invokes.
    pub tool: String,
    /// Id of the node to run next when the tool does not redirect.
    #[serde(default)]
    pub next: Option<String>,
}

impl Node {
    /// Create a terminal node (no static successor).
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            next: None,
        }
    }

    /// Set the static successor.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}

/// Caller-supplied graph definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGraphRequest {
    pub name: String,
    pub start_node: String,
    /// Step budget; the engine default applies when omitted.
    #[serde(default)]
    pub max_steps: Option<usize>,
    pub nodes: Vec<Node>,
}

/// A stored, immutable graph definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub id: GraphId,
    pub name: String,
    pub start_node: String,
    pub max_steps: usize,
    pub nodes: HashMap<String, Node>,
    pub created_at: DateTime<Utc>,
}

impl Graph {
    /// Build a graph with a fresh id.
    ///
    /// Nodes are keyed by id; a later node with a duplicate id replaces an
    /// earlier one. No structural validation happens here: dangling `next`
    /// references and a missing start node surface only when a run reaches
    /// them.
    pub fn new(
        name: impl Into<String>,
        start_node: impl Into<String>,
        max_steps: usize,
        nodes: Vec<Node>,
    ) -> Self {
        Self {
            id: GraphId::new(),
            name: name.into(),
            start_node: start_node.into(),
            max_steps,
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            created_at: Utc::now(),
        }
    }

    /// Build a graph from a request, filling the step budget if omitted.
    pub fn from_request(req: CreateGraphRequest, default_max_steps: usize) -> Self {
        Self::new(
            req.name,
            req.start_node,
            req.max_steps.unwrap_or(default_max_steps),
            req.nodes,
        )
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }
}

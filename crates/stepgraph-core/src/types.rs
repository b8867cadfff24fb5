use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::State;

/// Unique graph identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub String);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-step notification streamed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub run_id: RunId,
    pub step: usize,
    pub node: String,
    pub tool: String,
    pub state: State,
}

/// Engine event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A run was created and persisted.
    RunStarted { run_id: RunId, graph_id: GraphId },
    /// A node finished and its output was merged.
    StepCompleted(StepEvent),
    /// A run reached COMPLETED.
    RunCompleted { run_id: RunId, steps: usize },
    /// A run reached FAILED.
    RunFailed { run_id: RunId, error: String },
}

impl FlowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => run_id,
            Self::StepCompleted(step) => &step.run_id,
        }
    }
}

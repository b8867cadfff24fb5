use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::State;
use crate::types::{GraphId, RunId};

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed step. Immutable once appended to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub step: usize,
    pub node_id: String,
    pub tool: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state_snapshot: State,
    pub message: String,
}

/// Execution record of a single graph run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub graph_id: GraphId,
    pub status: RunStatus,
    pub state: State,
    pub logs: Vec<StepLogEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Run {
    /// Start a new run in RUNNING status.
    pub fn new(graph_id: GraphId, state: State) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            graph_id,
            status: RunStatus::Running,
            state,
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// Transition to COMPLETED. Terminal runs are left untouched.
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Transition to FAILED with a message. Terminal runs are left untouched.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Number of executed steps.
    pub fn steps(&self) -> usize {
        self.logs.len()
    }

    /// The response handed back to the caller of a run.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id.clone(),
            final_state: self.state.clone(),
            logs: self.logs.clone(),
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Caller-facing result of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub final_state: State,
    pub logs: Vec<StepLogEntry>,
    pub status: RunStatus,
    pub error: Option<String>,
}

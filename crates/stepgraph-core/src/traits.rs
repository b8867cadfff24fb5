use futures::future::BoxFuture;

use crate::error::Result;
use crate::graph::Graph;
use crate::run::Run;
use crate::state::{State, ToolOutput};
use crate::types::{GraphId, RunId};

/// Tool — a named transformation bound to graph nodes.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in node definitions).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the tool against the live run state.
    ///
    /// The state is borrowed, not copied. Changes are proposed through the
    /// returned [`ToolOutput`] and merged by the engine.
    fn execute<'a>(&'a self, state: &'a State) -> BoxFuture<'a, Result<ToolOutput>>;

    /// Timeout in seconds for this tool. `None` uses the registry default.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}

/// Graph store — persistence backend for graph definitions.
pub trait GraphStore: Send + Sync + 'static {
    /// Insert or replace a graph.
    fn put_graph(&self, graph: &Graph) -> BoxFuture<'_, Result<()>>;

    /// Load a graph by id.
    fn get_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<Option<Graph>>>;

    /// List all graphs.
    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<Graph>>>;
}

/// Run store — persistence backend for run records.
pub trait RunStore: Send + Sync + 'static {
    /// Insert or replace a run snapshot.
    fn put_run(&self, run: &Run) -> BoxFuture<'_, Result<()>>;

    /// Load the latest snapshot of a run.
    fn get_run(&self, id: &RunId) -> BoxFuture<'_, Result<Option<Run>>>;

    /// List runs, optionally restricted to one graph.
    fn list_runs(&self, graph_id: Option<&GraphId>) -> BoxFuture<'_, Result<Vec<Run>>>;
}

use std::collections::HashMap;
use std::sync::RwLock;

use futures::future::BoxFuture;

use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::graph::Graph;
use stepgraph_core::run::Run;
use stepgraph_core::traits::{GraphStore, RunStore};
use stepgraph_core::types::{GraphId, RunId};

/// Process-local store keeping graphs and runs in hash maps.
///
/// Each map sits behind its own `RwLock`, so concurrent runs can update
/// distinct keys while readers query snapshots.
pub struct MemoryStore {
    graphs: RwLock<HashMap<GraphId, Graph>>,
    runs: RwLock<HashMap<RunId, Run>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            graphs: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> FlowError {
    FlowError::Database(e.to_string())
}

impl GraphStore for MemoryStore {
    fn put_graph(&self, graph: &Graph) -> BoxFuture<'_, Result<()>> {
        let graph = graph.clone();
        Box::pin(async move {
            self.graphs
                .write()
                .map_err(poisoned)?
                .insert(graph.id.clone(), graph);
            Ok(())
        })
    }

    fn get_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<Option<Graph>>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.graphs.read().map_err(poisoned)?.get(&id).cloned()) })
    }

    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<Graph>>> {
        Box::pin(async move {
            let mut graphs: Vec<Graph> =
                self.graphs.read().map_err(poisoned)?.values().cloned().collect();
            graphs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(graphs)
        })
    }
}

impl RunStore for MemoryStore {
    fn put_run(&self, run: &Run) -> BoxFuture<'_, Result<()>> {
        let run = run.clone();
        Box::pin(async move {
            self.runs
                .write()
                .map_err(poisoned)?
                .insert(run.id.clone(), run);
            Ok(())
        })
    }

    fn get_run(&self, id: &RunId) -> BoxFuture<'_, Result<Option<Run>>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.runs.read().map_err(poisoned)?.get(&id).cloned()) })
    }

    fn list_runs(&self, graph_id: Option<&GraphId>) -> BoxFuture<'_, Result<Vec<Run>>> {
        let graph_id = graph_id.cloned();
        Box::pin(async move {
            let mut runs: Vec<Run> = self
                .runs
                .read()
                .map_err(poisoned)?
                .values()
                .filter(|r| graph_id.as_ref().map_or(true, |g| &r.graph_id == g))
                .cloned()
                .collect();
            runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(runs)
        })
    }
}

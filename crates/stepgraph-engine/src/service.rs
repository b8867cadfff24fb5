use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use stepgraph_core::config::EngineConfig;
use stepgraph_core::error::{FlowError, Result};
use stepgraph_core::event::EventBus;
use stepgraph_core::graph::{CreateGraphRequest, Graph};
use stepgraph_core::run::{Run, RunSummary};
use stepgraph_core::state::State;
use stepgraph_core::traits::{GraphStore, RunStore};
use stepgraph_core::types::{FlowEvent, GraphId, RunId};
use stepgraph_tools::ToolRegistry;

use crate::executor::GraphExecutor;

/// Front door for graph creation, execution, and queries.
///
/// Shared by the HTTP gateway and the CLI. All methods take `&self`; many
/// runs may be in flight at once.
pub struct GraphService {
    graphs: Arc<dyn GraphStore>,
    runs: Arc<dyn RunStore>,
    registry: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    config: EngineConfig,
    shutdown: CancellationToken,
}

impl GraphService {
    pub fn new(
        graphs: Arc<dyn GraphStore>,
        runs: Arc<dyn RunStore>,
        registry: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graphs,
            runs,
            registry,
            event_bus,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Store a new graph and return its id.
    pub async fn create_graph(&self, req: CreateGraphRequest) -> Result<GraphId> {
        let graph = Graph::from_request(req, self.config.default_max_steps);
        self.graphs.put_graph(&graph).await?;
        info!(
            graph_id = %graph.id,
            name = %graph.name,
            nodes = graph.nodes.len(),
            max_steps = graph.max_steps,
            "Graph created"
        );
        Ok(graph.id)
    }

    pub async fn get_graph(&self, id: &GraphId) -> Result<Graph> {
        self.graphs
            .get_graph(id)
            .await?
            .ok_or_else(|| FlowError::GraphNotFound(id.to_string()))
    }

    pub async fn list_graphs(&self) -> Result<Vec<Graph>> {
        self.graphs.list_graphs().await
    }

    /// Run a stored graph to completion.
    ///
    /// Fails only when the graph does not exist; everything after that is
    /// reported through the returned summary. The run executes on its own
    /// task, so it still reaches a terminal status if the caller is dropped.
    pub async fn run_graph(&self, graph_id: &GraphId, initial_state: State) -> Result<RunSummary> {
        let graph = self.get_graph(graph_id).await?;
        Ok(self.spawn_run(graph, initial_state).await)
    }

    /// Run a graph that is not in the store.
    pub async fn run_inline(&self, graph: &Graph, initial_state: State) -> RunSummary {
        self.spawn_run(graph.clone(), initial_state).await
    }

    async fn spawn_run(&self, graph: Graph, initial_state: State) -> RunSummary {
        let run = Run::new(graph.id.clone(), initial_state);
        let fallback = run.clone();
        let executor = self.executor();

        let handle = tokio::spawn(async move { executor.execute_run(&graph, run).await });
        match handle.await {
            Ok(summary) => summary,
            Err(e) => self.fail_lost_run(fallback, &e.to_string()).await,
        }
    }

    /// Close out a run whose task panicked or was aborted.
    async fn fail_lost_run(&self, fallback: Run, reason: &str) -> RunSummary {
        error!(run_id = %fallback.id, error = %reason, "Run task ended abnormally");
        let mut run = match self.runs.get_run(&fallback.id).await {
            Ok(Some(stored)) => stored,
            _ => fallback,
        };
        if run.status.is_terminal() {
            return run.summary();
        }

        let message = format!("Run task failed: {}", reason);
        run.fail(message.clone());
        if let Err(e) = self.runs.put_run(&run).await {
            warn!(run_id = %run.id, error = %e, "Failed to persist run snapshot");
        }
        self.event_bus.publish(FlowEvent::RunFailed {
            run_id: run.id.clone(),
            error: message,
        });
        run.summary()
    }

    pub async fn get_run(&self, id: &RunId) -> Result<Run> {
        self.runs
            .get_run(id)
            .await?
            .ok_or_else(|| FlowError::RunNotFound(id.to_string()))
    }

    pub async fn list_runs(&self, graph_id: Option<&GraphId>) -> Result<Vec<Run>> {
        self.runs.list_runs(graph_id).await
    }

    pub fn list_tools(&self) -> BTreeMap<String, String> {
        self.registry.list()
    }

    /// Cancel every in-flight run. Runs started afterwards fail immediately.
    pub fn shutdown(&self) {
        info!("Graph service shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn executor(&self) -> GraphExecutor {
        GraphExecutor::new(
            self.registry.clone(),
            self.runs.clone(),
            self.event_bus.clone(),
            self.shutdown.child_token(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    use stepgraph_core::graph::Node;
    use stepgraph_core::run::RunStatus;
    use stepgraph_store::MemoryStore;
    use stepgraph_test_utils::{mock_registry, state, SlowTool};

    fn service_with(registry: Arc<ToolRegistry>) -> GraphService {
        let store = Arc::new(MemoryStore::new());
        GraphService::new(
            store.clone(),
            store,
            registry,
            Arc::new(EventBus::new(64)),
            EngineConfig::default(),
        )
    }

    fn request(max_steps: Option<usize>) -> CreateGraphRequest {
        CreateGraphRequest {
            name: "counter".into(),
            start_node: "a".into(),
            max_steps,
            nodes: vec![Node::new("a", "inc").with_next("b"), Node::new("b", "inc")],
        }
    }

    #[tokio::test]
    async fn test_create_then_get_graph() {
        let service = service_with(mock_registry());
        let id = service.create_graph(request(Some(5))).await.unwrap();

        let graph = service.get_graph(&id).await.unwrap();
        assert_eq!(graph.id, id);
        assert_eq!(graph.name, "counter");
        assert_eq!(graph.start_node, "a");
        assert_eq!(graph.max_steps, 5);
        assert_eq!(graph.node("a").unwrap().next.as_deref(), Some("b"));
        assert_eq!(service.list_graphs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_default_step_budget() {
        let service = service_with(mock_registry());
        let id = service.create_graph(request(None)).await.unwrap();
        assert_eq!(service.get_graph(&id).await.unwrap().max_steps, 20);
    }

    #[tokio::test]
    async fn test_run_unknown_graph() {
        let service = service_with(mock_registry());
        let err = service
            .run_graph(&GraphId::from_string("nope"), State::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::GraphNotFound(_)));
        assert!(service.list_runs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_then_query() {
        let service = service_with(mock_registry());
        let id = service.create_graph(request(None)).await.unwrap();

        let summary = service
            .run_graph(&id, state(json!({"count": 10})))
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.final_state.get_i64("count"), Some(12));

        let run = service.get_run(&summary.run_id).await.unwrap();
        assert_eq!(run.graph_id, id);
        assert_eq!(run.logs.len(), 2);
        assert_eq!(service.list_runs(Some(&id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_run() {
        let service = service_with(mock_registry());
        let err = service
            .get_run(&RunId::from_string("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Run not found: missing");
    }

    #[tokio::test]
    async fn test_list_tools() {
        let service = service_with(mock_registry());
        let tools = service.list_tools();
        assert!(tools.contains_key("inc"));
        assert!(tools.contains_key("fail"));
    }

    async fn create_slow_graph(service: &GraphService) -> GraphId {
        service
            .create_graph(CreateGraphRequest {
                name: "slow-tail".into(),
                start_node: "a".into(),
                max_steps: None,
                nodes: vec![Node::new("a", "inc").with_next("b"), Node::new("b", "slow")],
            })
            .await
            .unwrap()
    }

    fn slow_service() -> Arc<GraphService> {
        let registry = mock_registry();
        registry.register(SlowTool::new("slow", Duration::from_secs(5)).with_timeout(60));
        Arc::new(service_with(registry))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_is_queryable_while_running() {
        let service = slow_service();
        let id = create_slow_graph(&service).await;

        let svc = service.clone();
        let handle =
            tokio::spawn(async move { svc.run_graph(&id, state(json!({"count": 0}))).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let runs = service.list_runs(None).await.unwrap();
        assert_eq!(runs.len(), 1);
        let run = service.get_run(&runs[0].id).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.logs.len(), 1);
        assert_eq!(run.state.get_i64("count"), Some(1));

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.run_id, run.id);
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.logs.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_finishes_after_caller_is_dropped() {
        let service = slow_service();
        let id = create_slow_graph(&service).await;

        let svc = service.clone();
        let handle = tokio::spawn(async move { svc.run_graph(&id, State::new()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_secs(120)).await;

        let runs = service.list_runs(None).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].logs.len(), 2);
    }

    #[tokio::test]
    async fn test_lost_run_is_marked_failed() {
        let service = service_with(mock_registry());
        let mut rx = service.event_bus().subscribe();
        let run = Run::new(GraphId::from_string("g1"), state(json!({"count": 1})));
        service.runs.put_run(&run).await.unwrap();

        let summary = service.fail_lost_run(run.clone(), "task panicked").await;

        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.error.as_deref(), Some("Run task failed: task panicked"));
        let stored = service.get_run(&run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(matches!(rx.recv().await.unwrap(), FlowEvent::RunFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_runs() {
        let registry = mock_registry();
        registry.register(SlowTool::new("slow", Duration::from_secs(3600)).with_timeout(7200));
        let service = Arc::new(service_with(registry));
        let id = service
            .create_graph(CreateGraphRequest {
                name: "slow".into(),
                start_node: "a".into(),
                max_steps: None,
                nodes: vec![Node::new("a", "slow")],
            })
            .await
            .unwrap();

        let svc = service.clone();
        let handle = tokio::spawn(async move { svc.run_graph(&id, State::new()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        service.shutdown();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.status, RunStatus::Failed);
        assert_eq!(summary.error.as_deref(), Some("Run cancelled"));
        assert!(service.is_shutdown());
    }
}

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use stepgraph_core::config::GatewayConfig;
use stepgraph_engine::GraphService;

use crate::routes;
use crate::state::AppState;

/// HTTP + WebSocket gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    service: Arc<GraphService>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, service: Arc<GraphService>) -> Self {
        Self { config, service }
    }

    /// Run the gateway server until the cancellation token is triggered.
    ///
    /// Shutdown also cancels in-flight runs so their handlers can return.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            service: self.service.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        let service = self.service.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                service.shutdown();
            })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Graphs and runs
        .route("/graph/create", post(routes::create_graph))
        .route("/graph/run", post(routes::run_graph))
        .route("/graph/state/{run_id}", get(routes::run_state))
        .route("/graph/{graph_id}", get(routes::get_graph))
        .route("/graphs", get(routes::list_graphs))
        .route("/tools", get(routes::list_tools))
        // Step stream
        .route("/ws/logs", get(routes::ws_logs))
        .route("/api/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use stepgraph_core::config::EngineConfig;
    use stepgraph_core::event::EventBus;
    use stepgraph_store::MemoryStore;
    use stepgraph_test_utils::mock_registry;

    fn test_state() -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new());
        let service = GraphService::new(
            store.clone(),
            store,
            mock_registry(),
            Arc::new(EventBus::new(64)),
            EngineConfig::default(),
        );
        Arc::new(AppState {
            config: GatewayConfig::default(),
            service: Arc::new(service),
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn counter_graph() -> Value {
        json!({
            "name": "counter",
            "start_node": "a",
            "nodes": [
                {"id": "a", "tool": "inc", "next": "b"},
                {"id": "b", "tool": "inc"}
            ]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(router(test_state()), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["bind"], GatewayConfig::default().bind);
        assert_eq!(body["shutting_down"], false);
    }

    #[tokio::test]
    async fn test_create_run_and_query() {
        let state = test_state();

        let (status, body) =
            send(router(state.clone()), "POST", "/graph/create", Some(counter_graph())).await;
        assert_eq!(status, StatusCode::OK);
        let graph_id = body["graph_id"].as_str().unwrap().to_string();

        let (status, graph) =
            send(router(state.clone()), "GET", &format!("/graph/{}", graph_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graph["max_steps"], 20);
        assert_eq!(graph["nodes"]["a"]["next"], "b");

        let (status, summary) = send(
            router(state.clone()),
            "POST",
            "/graph/run",
            Some(json!({"graph_id": graph_id, "initial_state": {"count": 1}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["status"], "COMPLETED");
        assert_eq!(summary["final_state"]["count"], 3);
        assert_eq!(summary["logs"].as_array().unwrap().len(), 2);

        let run_id = summary["run_id"].as_str().unwrap();
        let (status, run) =
            send(router(state), "GET", &format!("/graph/state/{}", run_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["status"], "COMPLETED");
        assert_eq!(run["state"]["count"], 3);
        assert!(run["error"].is_null());
    }

    #[tokio::test]
    async fn test_run_without_initial_state() {
        let state = test_state();
        let (_, body) =
            send(router(state.clone()), "POST", "/graph/create", Some(counter_graph())).await;
        let (status, summary) = send(
            router(state),
            "POST",
            "/graph/run",
            Some(json!({"graph_id": body["graph_id"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["final_state"]["count"], 2);
    }

    #[tokio::test]
    async fn test_not_found_responses() {
        let state = test_state();

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/graph/run",
            Some(json!({"graph_id": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Graph not found: nope");

        let (status, body) = send(router(state.clone()), "GET", "/graph/state/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Run not found: nope");

        let (status, _) = send(router(state), "GET", "/graph/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_create_body_rejected() {
        let (status, _) = send(
            router(test_state()),
            "POST",
            "/graph/create",
            Some(json!({"name": "missing start"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_list_tools_and_graphs() {
        let state = test_state();
        send(router(state.clone()), "POST", "/graph/create", Some(counter_graph())).await;

        let (_, tools) = send(router(state.clone()), "GET", "/tools", None).await;
        assert_eq!(tools["inc"], "Increments a counter");

        let (_, graphs) = send(router(state), "GET", "/graphs", None).await;
        assert_eq!(graphs["graphs"].as_array().unwrap().len(), 1);
    }
}

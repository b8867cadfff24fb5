use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{debug, info};

use stepgraph_core::graph::{CreateGraphRequest, Graph};
use stepgraph_core::run::RunSummary;
use stepgraph_core::types::{GraphId, RunId};

use crate::connection;
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bind": state.config.bind,
        "shutting_down": state.service.is_shutdown(),
    }))
}

// POST /graph/create
pub async fn create_graph(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGraphRequest>,
) -> ApiResult<serde_json::Value> {
    let graph_id = state.service.create_graph(req).await?;
    Ok(Json(serde_json::json!({ "graph_id": graph_id })))
}

// GET /graph/{graph_id}
pub async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Graph> {
    let graph = state.service.get_graph(&GraphId::from_string(&id)).await?;
    Ok(Json(graph))
}

// GET /graphs
pub async fn list_graphs(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let graphs = state.service.list_graphs().await?;
    Ok(Json(serde_json::json!({ "graphs": graphs })))
}

#[derive(Deserialize)]
pub struct RunGraphBody {
    pub graph_id: GraphId,
    #[serde(default)]
    pub initial_state: Option<stepgraph_core::state::State>,
}

// POST /graph/run
pub async fn run_graph(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunGraphBody>,
) -> ApiResult<RunSummary> {
    info!(graph_id = %body.graph_id, "Run requested");
    let summary = state
        .service
        .run_graph(&body.graph_id, body.initial_state.unwrap_or_default())
        .await?;
    Ok(Json(summary))
}

// GET /graph/state/{run_id}
pub async fn run_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let run = state.service.get_run(&RunId::from_string(&id)).await?;
    Ok(Json(serde_json::json!({
        "run_id": run.id,
        "graph_id": run.graph_id,
        "status": run.status,
        "state": run.state,
        "logs": run.logs,
        "error": run.error,
    })))
}

// GET /tools
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.service.list_tools()))
}

#[derive(Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub run_id: Option<String>,
}

// GET /ws/logs?run_id=… — WebSocket step stream
pub async fn ws_logs(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<LogsQuery>,
) -> impl IntoResponse {
    let filter = q.run_id.filter(|s| !s.is_empty()).map(|s| RunId::from_string(&s));
    ws.on_upgrade(move |socket| handle_ws(socket, state, filter))
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>, filter: Option<RunId>) {
    info!(run_filter = ?filter.as_ref().map(|r| r.as_str()), "WebSocket client connected");
    connection::handle_connection(socket, state.service.event_bus().clone(), filter).await;
    debug!("WebSocket client disconnected");
}

use std::sync::Arc;

use stepgraph_core::config::GatewayConfig;
use stepgraph_engine::GraphService;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub service: Arc<GraphService>,
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use stepgraph_core::error::FlowError;

/// Handler error rendered as `{"detail": "<message>"}`.
///
/// Lookup misses map to 404; everything else is a 500.
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            warn!(error = %self.0, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = serde_json::json!({ "detail": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

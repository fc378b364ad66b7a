//! Router assembly.

mod api;
mod common;

pub use api::api_routes;
pub use common::common_routes;

use crate::state::AppState;
use axum::{
    body::to_bytes,
    http::header,
    middleware::map_response,
    response::{IntoResponse, Response},
    Json, Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

const MAX_ERROR_TEXT: usize = 16 * 1024;

/// Full application router with request tracing and a body size cap.
pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(api_routes(state))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(map_response(json_error_body))
        .layer(TraceLayer::new_for_http())
}

/// Rewrite plain-text error responses from extractors and layers (413, bad path,
/// unmatched route) into `{"error": message}` with the same status.
async fn json_error_body(response: Response) -> Response {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json || !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let text = to_bytes(response.into_body(), MAX_ERROR_TEXT)
        .await
        .map(|b| String::from_utf8_lossy(&b).trim().to_string())
        .unwrap_or_default();
    let error = if text.is_empty() {
        status.canonical_reason().unwrap_or("Request failed").to_string()
    } else {
        text
    };
    tracing::debug!(status = status.as_u16(), error = %error, "request rejected before dispatch");
    (status, Json(serde_json::json!({ "error": error }))).into_response()
}

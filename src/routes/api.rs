//! `/api` routes. Every method reaches the handler so unsupported ones get the JSON 405 body.

use crate::handlers::{auth, resource};
use crate::state::AppState;
use axum::{routing::any, Router};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth", any(auth))
        .route("/api/:resource", any(resource))
        .with_state(state)
}

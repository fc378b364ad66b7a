//! `/api/auth`: login against the account entity.

use crate::error::AppError;
use crate::handlers::resource::json_body;
use crate::response::Reply;
use crate::service::{AccountService, LoginRequest};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::Method,
};
use serde_json::Value;
use std::collections::HashMap;

pub async fn auth(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Reply {
    login(&state, &method, query.get("action").map(String::as_str), &body)
        .await
        .into()
}

async fn login(state: &AppState, method: &Method, action: Option<&str>, body: &[u8]) -> Result<Reply, AppError> {
    if *method != Method::POST || action != Some("login") {
        return Err(AppError::MethodNotSupported);
    }
    let req: LoginRequest = json_body(body)?;
    let mut user = AccountService::new(state.backend.as_ref(), &state.model)?
        .login(&req)
        .await?;
    user.insert("loggedIn".into(), Value::Bool(true));
    Ok(Reply::ok(serde_json::json!({ "user": user })))
}

//! Dispatcher result: a status plus JSON body.

use crate::error::AppError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Serialize)]
pub struct Saved {
    pub success: bool,
    pub id: i64,
}

#[derive(Serialize)]
pub struct Done {
    pub success: bool,
}

impl Reply {
    pub fn ok<T: Serialize>(body: T) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    pub fn created<T: Serialize>(body: T) -> Self {
        Self::with_status(StatusCode::CREATED, body)
    }

    pub fn with_status<T: Serialize>(status: StatusCode, body: T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Reply { status, body },
            Err(e) => Self::from_error(&AppError::Internal(format!("serialize response: {e}"))),
        }
    }

    /// Single translation point for errors: the error's status and `{"error": message}`.
    pub fn from_error(err: &AppError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %err, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
        }
        Reply {
            status,
            body: serde_json::json!({ "error": err.to_string() }),
        }
    }
}

impl From<Result<Reply, AppError>> for Reply {
    fn from(r: Result<Reply, AppError>) -> Self {
        r.unwrap_or_else(|e| Reply::from_error(&e))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key on entity {entity}: {reason}")]
    InvalidPrimaryKey { entity: String, reason: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },
}

/// Fault raised by a storage backend. Never shown to API callers; the repository wraps it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("unique constraint violated on {table}.{column}")]
    UniqueViolation { table: String, column: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// HTTP-like status carried up when the repository wraps this fault.
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::Db(sqlx::Error::Database(db)) => {
                if db.is_unique_violation() {
                    StatusCode::CONFLICT
                } else if db.is_foreign_key_violation() {
                    StatusCode::UNPROCESSABLE_ENTITY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            StoreError::Db(sqlx::Error::PoolTimedOut) | StoreError::Db(sqlx::Error::Io(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            StoreError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::UniqueViolation { .. } => StatusCode::CONFLICT,
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(String),
    #[error("invalid filter field: {field}")]
    InvalidFilterField { field: String },
    #[error("{entity} {id} not found")]
    EntityNotFound { entity: String, id: i64 },
    #[error("{operation} failed")]
    Repository {
        operation: String,
        status: StatusCode,
        #[source]
        cause: StoreError,
    },
    #[error("Method not allowed")]
    MethodNotSupported,
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a backend fault for `operation`, keeping its status but not its text.
    pub fn repository(operation: impl Into<String>, cause: StoreError) -> Self {
        let operation = operation.into();
        tracing::error!(operation = %operation, error = %cause, "storage backend fault");
        AppError::Repository {
            operation,
            status: cause.status(),
            cause,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::InvalidFilterField { .. } | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::EntityNotFound { .. } | AppError::UnknownResource(_) => StatusCode::NOT_FOUND,
            AppError::Repository { status, .. } => *status,
            AppError::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_error_hides_backend_text() {
        let err = AppError::repository(
            "save asset",
            StoreError::Unavailable("connection refused by 10.0.0.7:5432".into()),
        );
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "save asset failed");
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = AppError::repository(
            "save user",
            StoreError::UniqueViolation {
                table: "user".into(),
                column: "username".into(),
            },
        );
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn statuses() {
        assert_eq!(AppError::MethodNotSupported.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(AppError::MethodNotSupported.to_string(), "Method not allowed");
        assert_eq!(
            AppError::InvalidFilterField { field: "x".into() }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::EntityNotFound { entity: "asset".into(), id: 3 }.to_string(),
            "asset 3 not found"
        );
    }
}

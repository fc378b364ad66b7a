//! Resource dispatcher: `(method, action)` on `/api/<resource>` to a repository call.

use crate::error::AppError;
use crate::response::{Done, Reply, Saved};
use crate::service::{AccountService, ChangePasswordRequest, EntityRepository};
use crate::sql::QueryOptions;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    All,
    One,
    Filtered,
    Example,
    Save,
    ChangePassword,
}

impl Action {
    /// The supported method/action pairs. Anything else is `None`.
    pub fn resolve(method: &Method, action: Option<&str>) -> Option<Self> {
        let action = action?;
        if *method == Method::GET {
            match action {
                "all" => Some(Action::All),
                "one" => Some(Action::One),
                "filtered" => Some(Action::Filtered),
                _ => None,
            }
        } else if *method == Method::POST {
            match action {
                "example" => Some(Action::Example),
                "save" => Some(Action::Save),
                "change-password" => Some(Action::ChangePassword),
                _ => None,
            }
        } else {
            None
        }
    }
}

pub async fn resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Reply {
    dispatch(&state, &resource, &method, &query, &body).await
}

/// Run one request against `resource`. Never fails: errors become `{status, {"error"}}`.
pub async fn dispatch(
    state: &AppState,
    resource: &str,
    method: &Method,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Reply {
    run(state, resource, method, query, body).await.into()
}

async fn run(
    state: &AppState,
    resource: &str,
    method: &Method,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Result<Reply, AppError> {
    let entity = state
        .model
        .entity_by_path(resource)
        .ok_or_else(|| AppError::UnknownResource(resource.to_string()))?;
    let action = Action::resolve(method, query.get("action").map(String::as_str))
        .filter(|a| *a != Action::ChangePassword || state.model.is_account_entity(resource))
        .ok_or(AppError::MethodNotSupported)?;
    tracing::debug!(resource, ?action, "dispatch");

    let repo = EntityRepository::new(state.backend.as_ref(), entity);
    match action {
        Action::All => {
            let options = QueryOptions::from_query(query)?.without_filter();
            Ok(Reply::ok(repo.search(&options).await?))
        }
        Action::One => {
            let param = entity.id_param();
            let raw = query
                .get(&param)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| AppError::BadRequest(format!("{} is required", param)))?;
            let id = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| AppError::BadRequest(format!("{} must be an integer", param)))?;
            Ok(Reply::ok(repo.find_by_id(id).await?))
        }
        Action::Filtered => {
            let options = QueryOptions::from_query(query)?;
            Ok(Reply::ok(repo.search(&options).await?))
        }
        Action::Example => {
            let example = json_object(body)?;
            let options = QueryOptions::from_query(query)?;
            Ok(Reply::ok(repo.find_by_example(&example, &options).await?))
        }
        Action::Save => {
            let outcome = repo.upsert(json_object(body)?).await?;
            let saved = Saved {
                success: true,
                id: outcome.id,
            };
            Ok(if outcome.created {
                Reply::created(saved)
            } else {
                Reply::ok(saved)
            })
        }
        Action::ChangePassword => {
            let req: ChangePasswordRequest = json_body(body)?;
            let id = account_id(query.get(&entity.id_param()), req.id.as_ref())?;
            AccountService::new(state.backend.as_ref(), &state.model)?
                .change_password(id, &req)
                .await?;
            Ok(Reply::ok(Done { success: true }))
        }
    }
}

/// Id for `change-password`: the `<resource>Id` query parameter, else the body `id`.
fn account_id(query: Option<&String>, body: Option<&Value>) -> Result<i64, AppError> {
    let parsed = match (query.filter(|s| !s.trim().is_empty()), body) {
        (Some(s), _) => s.trim().parse::<i64>().ok(),
        (None, Some(Value::Number(n))) => n.as_i64(),
        (None, Some(Value::String(s))) => s.trim().parse::<i64>().ok(),
        (None, _) => return Err(AppError::BadRequest("id is required".into())),
    };
    parsed.ok_or_else(|| AppError::BadRequest("id must be an integer".into()))
}

pub(crate) fn json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("malformed JSON body: {e}")))
}

fn json_object(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    match json_body::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_known_pairs_resolve() {
        assert_eq!(Action::resolve(&Method::GET, Some("all")), Some(Action::All));
        assert_eq!(Action::resolve(&Method::POST, Some("save")), Some(Action::Save));
        assert_eq!(Action::resolve(&Method::GET, Some("save")), None);
        assert_eq!(Action::resolve(&Method::POST, Some("all")), None);
        assert_eq!(Action::resolve(&Method::DELETE, Some("one")), None);
        assert_eq!(Action::resolve(&Method::GET, None), None);
    }

    #[test]
    fn account_id_sources() {
        assert_eq!(account_id(Some(&"3".to_string()), Some(&json!(9))).unwrap(), 3);
        assert_eq!(account_id(None, Some(&json!(9))).unwrap(), 9);
        assert_eq!(account_id(None, Some(&json!("9"))).unwrap(), 9);
        assert!(matches!(account_id(None, None), Err(AppError::BadRequest(_))));
        assert!(account_id(Some(&"x".to_string()), None).is_err());
    }

    #[test]
    fn bodies() {
        assert!(json_object(b"").unwrap().is_empty());
        assert!(matches!(json_object(b"[1]"), Err(AppError::BadRequest(_))));
        assert!(matches!(json_object(b"{\"a\":"), Err(AppError::BadRequest(_))));
    }
}

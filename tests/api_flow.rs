use asset_admin::{app, builtin, resolve, AppState, MemoryBackend};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn setup() -> (Router, Arc<MemoryBackend>) {
    setup_with_limit(64 * 1024)
}

fn setup_with_limit(max_body_bytes: usize) -> (Router, Arc<MemoryBackend>) {
    let model = resolve(&builtin().unwrap()).unwrap();
    let store = Arc::new(MemoryBackend::new());
    let state = AppState {
        model: Arc::new(model),
        backend: store.clone(),
    };
    (app(state, max_body_bytes), store)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn save(app: &Router, resource: &str, body: Value) -> i64 {
    let (status, reply) = call(app, Method::POST, &format!("/api/{}?action=save", resource), Some(body)).await;
    assert!(status == StatusCode::CREATED || status == StatusCode::OK, "{status}: {reply}");
    reply["id"].as_i64().unwrap()
}

fn jane(department_id: i64) -> Value {
    json!({
        "firstname": "Jane", "lastname": "Doe", "email": "jane@example.com",
        "username": format!("jane{}", department_id), "password": "correct horse",
        "department_id": department_id
    })
}

#[tokio::test]
async fn saved_asset_reads_back() {
    let (app, _) = setup();
    let (status, reply) = call(
        &app,
        Method::POST,
        "/api/asset?action=save",
        Some(json!({"name": "Laptop", "category_id": 1, "department_id": 2, "user_id": 5, "cost": 900})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["success"], json!(true));
    let id = reply["id"].as_i64().unwrap();

    let (status, row) = call(&app, Method::GET, &format!("/api/asset?action=one&assetId={}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["id"], json!(id));
    assert_eq!(row["name"], json!("Laptop"));
    assert_eq!(row["category_id"], json!(1));
    assert_eq!(row["department_id"], json!(2));
    assert_eq!(row["user_id"], json!(5));
    assert_eq!(row["cost"], json!(900));
    assert_eq!(row["deleted"], json!(false));
}

#[tokio::test]
async fn update_returns_ok_and_missing_id_is_not_found() {
    let (app, _) = setup();
    let id = save(&app, "category", json!({"name": "Laptops"})).await;

    let (status, reply) = call(
        &app,
        Method::POST,
        "/api/category?action=save",
        Some(json!({"id": id, "name": "Notebooks"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"success": true, "id": id}));

    let (status, reply) = call(
        &app,
        Method::POST,
        "/api/category?action=save",
        Some(json!({"id": 999, "name": "Ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(reply["error"].is_string());

    let (_, all) = call(&app, Method::GET, "/api/category?action=all", None).await;
    assert_eq!(all, json!([{"id": id, "name": "Notebooks"}]));
}

#[tokio::test]
async fn unknown_sort_falls_back() {
    let (app, _) = setup();
    for name in ["b", "a", "c"] {
        save(&app, "department", json!({"name": name})).await;
    }
    let (status, rows) = call(
        &app,
        Method::GET,
        "/api/department?action=all&sort=unknownCol&direction=ASC",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = rows.as_array().unwrap().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);

    let (_, rows) = call(&app, Method::GET, "/api/department?action=all&sort=name&direction=asc", None).await;
    let names: Vec<_> = rows.as_array().unwrap().iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("c"), json!("b"), json!("a")]);
}

#[tokio::test]
async fn example_matches_department() {
    let (app, _) = setup();
    let first = save(&app, "user", jane(2)).await;
    save(&app, "user", jane(3)).await;
    let third = save(&app, "user", jane(22)).await;
    save(&app, "user", json!({"id": third, "department_id": 2})).await;

    let (status, rows) = call(
        &app,
        Method::POST,
        "/api/user?action=example&direction=ASC",
        Some(json!({"department_id": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(first), json!(third)]);
    assert!(rows.iter().all(|r| r.get("password").is_none()));
}

#[tokio::test]
async fn unsupported_combinations_never_touch_storage() {
    let (app, store) = setup();
    for (method, uri) in [
        (Method::GET, "/api/asset?action=bogus"),
        (Method::POST, "/api/asset?action=bogus"),
        (Method::DELETE, "/api/asset?action=one&assetId=1"),
        (Method::PUT, "/api/asset?action=save"),
        (Method::GET, "/api/asset"),
        (Method::POST, "/api/asset?action=change-password"),
        (Method::GET, "/api/auth?action=login"),
    ] {
        let (status, body) = call(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        assert_eq!(body, json!({"error": "Method not allowed"}));
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn invalid_filter_field_reads_nothing() {
    let (app, store) = setup();
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/user?action=example",
        Some(json!({"password": "correct horse"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("password"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/asset?action=example",
        Some(json!({"colour": "red"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn free_text_search_and_soft_delete() {
    let (app, _) = setup();
    let laptop = save(&app, "asset", json!({"name": "ThinkPad", "serial_number": "SN-100"})).await;
    let monitor = save(&app, "asset", json!({"name": "Monitor", "description": "for the thinkpad dock"})).await;
    save(&app, "asset", json!({"name": "Desk"})).await;

    let (status, rows) = call(&app, Method::GET, "/api/asset?action=filtered&filter=THINK", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = rows.as_array().unwrap().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(monitor), json!(laptop)]);

    save(&app, "asset", json!({"id": laptop, "deleted": true})).await;
    let (status, row) = call(&app, Method::GET, &format!("/api/asset?action=one&assetId={}", laptop), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["deleted"], json!(true));

    let (_, active) = call(
        &app,
        Method::POST,
        "/api/asset?action=example",
        Some(json!({"deleted": false})),
    )
    .await;
    assert!(active.as_array().unwrap().iter().all(|r| r["id"] != json!(laptop)));
    assert_eq!(active.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn request_errors() {
    let (app, store) = setup();
    let cases = [
        (Method::GET, "/api/widget?action=all", None, StatusCode::NOT_FOUND),
        (Method::GET, "/api/asset?action=one", None, StatusCode::BAD_REQUEST),
        (Method::GET, "/api/asset?action=one&assetId=abc", None, StatusCode::BAD_REQUEST),
        (Method::GET, "/api/asset?action=all&limit=-1", None, StatusCode::BAD_REQUEST),
        (Method::POST, "/api/asset?action=save", Some(json!([1, 2])), StatusCode::BAD_REQUEST),
        (Method::POST, "/api/asset?action=save", Some(json!({"cost": 5})), StatusCode::BAD_REQUEST),
    ];
    for (method, uri, body, expected) in cases {
        let (status, reply) = call(&app, method, uri, body).await;
        assert_eq!(status, expected, "{uri}");
        assert!(reply["error"].is_string());
    }
    assert_eq!(store.calls(), 0);

    let (status, _) = call(&app, Method::GET, "/api/asset?action=one&assetId=7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn storage_faults_are_opaque() {
    let (app, store) = setup();
    store.set_failure(Some("connection refused by 10.0.0.7:5432"));
    let (status, reply) = call(&app, Method::GET, "/api/asset?action=all", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(reply, json!({"error": "fetch asset failed"}));

    let (status, _) = call(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    store.set_failure(None);
    let (status, _) = call(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let (app, _) = setup();
    save(&app, "user", jane(1)).await;
    let (status, reply) = call(&app, Method::POST, "/api/user?action=save", Some(jane(1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(reply, json!({"error": "save user failed"}));
}

#[tokio::test]
async fn login_and_change_password() {
    let (app, _) = setup();
    let id = save(&app, "user", jane(1)).await;

    let (status, reply) = call(
        &app,
        Method::POST,
        "/api/auth?action=login",
        Some(json!({"username": "jane1", "password": "correct horse", "rememberMe": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["user"]["id"], json!(id));
    assert_eq!(reply["user"]["loggedIn"], json!(true));
    assert!(reply["user"].get("password").is_none());

    let (wrong_pw, a) = call(
        &app,
        Method::POST,
        "/api/auth?action=login",
        Some(json!({"username": "jane1", "password": "nope nope"})),
    )
    .await;
    let (wrong_user, b) = call(
        &app,
        Method::POST,
        "/api/auth?action=login",
        Some(json!({"username": "ghost", "password": "correct horse"})),
    )
    .await;
    assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_user, StatusCode::UNAUTHORIZED);
    assert_eq!(a, b);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/user?action=change-password&userId={}", id),
        Some(json!({"currentPassword": "wrong one", "newPassword": "battery staple"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, reply) = call(
        &app,
        Method::POST,
        "/api/user?action=change-password",
        Some(json!({"id": id, "currentPassword": "correct horse", "newPassword": "battery staple"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply, json!({"success": true}));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth?action=login",
        Some(json!({"username": "jane1", "password": "battery staple"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn common_routes() {
    let (app, _) = setup();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    let (_, body) = call(&app, Method::GET, "/version", None).await;
    assert_eq!(body["name"], json!("asset-admin"));
}

#[tokio::test]
async fn rejections_outside_the_dispatcher_are_json() {
    let (app, store) = setup_with_limit(16);
    let big = json!({"name": "A laptop with a long description"});

    let (status, body) = call(&app, Method::POST, "/api/asset?action=save", Some(big.clone())).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());

    let payload = big.to_string();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/asset?action=save")
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());

    let (status, body) = call(&app, Method::GET, "/api/%FF?action=all", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = call(&app, Method::GET, "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn ids_beyond_the_column_range() {
    let (app, _) = setup();
    save(&app, "asset", json!({"name": "Laptop", "department_id": 2})).await;

    let (status, body) = call(&app, Method::GET, "/api/asset?action=one&assetId=9999999999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/asset?action=example",
        Some(json!({"department_id": 9999999999i64})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/asset?action=save",
        Some(json!({"name": "Desk", "category_id": 9999999999i64})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

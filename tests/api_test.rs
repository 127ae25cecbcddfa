mod helpers;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use helpers::{shared_db, FakeChatModel};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use suzanne::api::{build_router, AppState};
use suzanne::chat::ChatService;
use suzanne::config::SuzanneConfig;
use tower::ServiceExt;

fn app_with_model(model: Arc<FakeChatModel>) -> Router {
    let config = SuzanneConfig::default();
    let db = shared_db();
    let chat = Arc::new(ChatService::new(Arc::clone(&db), model, config.model.clone()));
    build_router(AppState {
        db,
        chat,
        config: Arc::new(config),
    })
}

fn app() -> Router {
    app_with_model(FakeChatModel::new())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn facts_round_trip_newest_first() {
    let app = app();
    for fact in ["likes rust", "goal: IIT"] {
        let (status, body) = send(&app, Method::POST, "/api/facts", Some(json!({ "fact": fact }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
    }

    let (status, body) = send(&app, Method::GET, "/api/facts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["goal: IIT", "likes rust"]));
}

#[tokio::test]
async fn blank_fact_is_bad_request() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/api/facts", Some(json!({ "fact": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn session_message_lifecycle() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "id": "s1", "name": "Physics" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "id": "s1" }));

    for (role, content, kind) in [
        ("model", "Hi Bro what's up", "text"),
        ("user", "data:image/png;base64,AAAA", "image"),
    ] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/messages",
            Some(json!({ "session_id": "s1", "role": role, "content": content, "type": kind })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, sessions) = send(&app, Method::GET, "/api/sessions", None).await;
    assert_eq!(sessions[0]["id"], "s1");
    assert_eq!(sessions[0]["name"], "Physics");

    let (status, log) = send(&app, Method::GET, "/api/sessions/s1/messages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(log.as_array().unwrap().len(), 2);
    assert_eq!(log[0]["role"], "model");
    assert_eq!(log[1]["type"], "image");

    let (status, body) = send(&app, Method::DELETE, "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (_, log) = send(&app, Method::GET, "/api/sessions/s1/messages", None).await;
    assert_eq!(log, json!([]));

    let (status, _) = send(&app, Method::DELETE, "/api/sessions/s1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_id_is_generated_when_absent() {
    let app = app();
    let (status, body) = send(&app, Method::POST, "/api/sessions", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn message_for_unknown_session_is_not_found() {
    let app = app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/messages",
        Some(json!({ "session_id": "ghost", "role": "user", "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_endpoint_returns_reply() {
    let model = FakeChatModel::new();
    model.respond_text("bet, here's the answer");
    let app = app_with_model(model);

    let (status, body) = send(&app, Method::POST, "/api/chat", Some(json!({ "text": "2+2?" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "bet, here's the answer");

    let session_id = body["session_id"].as_str().unwrap();
    let (_, log) = send(&app, Method::GET, &format!("/api/sessions/{session_id}/messages"), None).await;
    assert_eq!(log.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn chat_upstream_failure_is_bad_gateway() {
    let model = FakeChatModel::new();
    model.fail(500);
    let app = app_with_model(model);

    let (status, body) = send(&app, Method::POST, "/api/chat", Some(json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn empty_chat_turn_is_bad_request() {
    let app = app();
    let (status, _) = send(&app, Method::POST, "/api/chat", Some(json!({ "text": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

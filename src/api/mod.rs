//! REST API consumed by the browser front end.
//!
//! Routes live under `/api`; see [`build_router`]. Handlers hop onto the
//! blocking pool for SQLite work, the same way chat turns do.

pub mod chat;
pub mod facts;
pub mod messages;
pub mod sessions;

use std::sync::{Arc, Mutex};

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use tower_http::trace::TraceLayer;

use crate::chat::{ChatError, ChatService};
use crate::config::SuzanneConfig;
use crate::llm::LlmError;
use crate::store::StoreError;

/// Image data URLs arrive inline in JSON bodies.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub chat: Arc<ChatService>,
    pub config: Arc<SuzanneConfig>,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Invalid(msg) => ApiError::BadRequest(msg),
            StoreError::Sqlite(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyTurn | ChatError::InvalidImage(_) => ApiError::BadRequest(err.to_string()),
            ChatError::Store(e) => e.into(),
            ChatError::Model(LlmError::NotConfigured(m)) => ApiError::Internal(m),
            ChatError::Model(e) => ApiError::Upstream(e.to_string()),
            ChatError::Internal(m) => ApiError::Internal(m),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Run a store operation on the blocking pool.
pub(crate) async fn run_db<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
{
    let db = Arc::clone(&state.db);
    tokio::task::spawn_blocking(move || {
        let mut conn = db
            .lock()
            .map_err(|e| ApiError::Internal(format!("db lock poisoned: {e}")))?;
        f(&mut conn).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("db task failed: {e}")))?
}

fn success() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/facts", get(facts::list_facts).post(facts::save_fact))
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route("/sessions/{id}", delete(sessions::delete_session))
        .route("/sessions/{id}/messages", get(messages::list_messages))
        .route("/messages", post(messages::append_message))
        .route("/chat", post(chat::chat))
}

/// The full application router: API, body limit and request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

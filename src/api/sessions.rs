use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{run_db, success, ApiError, ApiResult, AppState};
use crate::store::sessions;
use crate::store::types::Session;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionParams {
    /// Client-chosen id. A UUID v7 is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name. Defaults to a timestamped name.
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<Session>>> {
    let sessions = run_db(&state, |conn| sessions::list_sessions(conn)).await?;
    Ok(Json(sessions))
}

/// Create a bare session record. Greeting and chat flow are left to the
/// caller; `/api/chat` starts its own sessions with a greeting.
pub async fn create_session(
    State(state): State<AppState>,
    Json(params): Json<CreateSessionParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = params
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Chat {}", chrono::Local::now().format("%Y-%m-%d %H:%M")));

    let session = run_db(&state, move |conn| sessions::create_session(conn, &id, &name)).await?;
    tracing::info!(session_id = %session.id, "session created via api");

    Ok(Json(serde_json::json!({ "success": true, "id": session.id })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let lookup = id.clone();
    let removed = run_db(&state, move |conn| sessions::delete_session(conn, &lookup)).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("session {id} not found")));
    }
    Ok(success())
}

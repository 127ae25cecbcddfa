use axum::extract::{Path, State};
use axum::Json;

use super::{run_db, success, ApiResult, AppState};
use crate::store::messages;
use crate::store::types::{Message, NewMessage};

pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = run_db(&state, move |conn| messages::list_messages(conn, &session_id)).await?;
    Ok(Json(messages))
}

pub async fn append_message(
    State(state): State<AppState>,
    Json(message): Json<NewMessage>,
) -> ApiResult<Json<serde_json::Value>> {
    run_db(&state, move |conn| messages::append_message(conn, &message)).await?;
    Ok(success())
}

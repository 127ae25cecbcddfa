use axum::extract::State;
use axum::Json;

use super::{ApiResult, AppState};
use crate::chat::{ChatReply, ChatTurn};

/// Run one chat turn: persist, ask the model, persist the reply.
pub async fn chat(
    State(state): State<AppState>,
    Json(turn): Json<ChatTurn>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state.chat.send_message(turn).await?;
    Ok(Json(reply))
}

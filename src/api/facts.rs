use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use super::{run_db, success, ApiResult, AppState};
use crate::store::facts;

#[derive(Debug, Deserialize)]
pub struct SaveFactParams {
    pub fact: String,
}

/// Fact strings, newest first.
pub async fn list_facts(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let facts = run_db(&state, |conn| facts::list_facts(conn)).await?;
    Ok(Json(facts.into_iter().map(|f| f.fact).collect()))
}

pub async fn save_fact(
    State(state): State<AppState>,
    Json(params): Json<SaveFactParams>,
) -> ApiResult<Json<serde_json::Value>> {
    run_db(&state, move |conn| facts::save_fact(conn, &params.fact)).await?;
    Ok(success())
}

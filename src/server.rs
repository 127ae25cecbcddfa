//! HTTP server initialization.
//!
//! [`serve`] opens the database, builds the chat service and serves the
//! REST API (plus the optional static front end) until Ctrl-C.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use crate::api::{self, AppState};
use crate::chat::ChatService;
use crate::config::SuzanneConfig;
use crate::db;
use crate::llm::{ChatModel, GeminiClient};

/// Shared setup: open DB, create the model client, wrap everything for sharing.
pub fn build_state(config: SuzanneConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    if config.model.api_key.trim().is_empty() {
        tracing::warn!("no API key configured: /api/chat will fail until GEMINI_API_KEY is set");
    }
    let model: Arc<dyn ChatModel> = match GeminiClient::new(&config.model) {
        Ok(client) => Arc::new(client),
        Err(e) => Arc::new(Unconfigured(e.to_string())),
    };

    let db = Arc::new(Mutex::new(conn));
    let chat = Arc::new(ChatService::new(
        Arc::clone(&db),
        model,
        config.model.clone(),
    ));

    Ok(AppState {
        db,
        chat,
        config: Arc::new(config),
    })
}

/// Stand-in model that reports why the real client could not be built, so
/// the rest of the API stays usable without a key.
struct Unconfigured(String);

#[async_trait::async_trait]
impl ChatModel for Unconfigured {
    async fn generate(
        &self,
        _request: &crate::llm::GenerateRequest,
    ) -> crate::llm::LlmResult<crate::llm::GenerateResponse> {
        Err(crate::llm::LlmError::NotConfigured(self.0.clone()))
    }
}

/// Router with the API and, if configured, the static front end with
/// `index.html` fallback for client-side routes.
pub fn app(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let router = api::build_router(state);

    match static_dir {
        Some(dir) => {
            let index = Path::new(&dir).join("index.html");
            tracing::info!(dir = %dir, "serving static front end");
            router.fallback_service(ServeDir::new(&dir).not_found_service(ServeFile::new(index)))
        }
        None => router,
    }
}

/// Start the HTTP server.
pub async fn serve(config: SuzanneConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting Suzanne server");

    let state = build_state(config)?;
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down server");
        })
        .await?;

    Ok(())
}

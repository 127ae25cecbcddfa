//! CLI `chat` command: interactive text chat in the terminal.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine as _;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::chat::{ChatService, ChatTurn};
use crate::config::SuzanneConfig;
use crate::llm::prompt::Difficulty;
use crate::llm::GeminiClient;
use crate::store::messages;
use crate::store::types::{MessageKind, Role};

/// Build a `data:` URL for an image file.
pub fn image_data_url(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image: {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let mime = match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

fn thinking_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Suzanne is thinking...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run a chat REPL. `/quit` or end of input exits.
pub async fn chat(
    config: &SuzanneConfig,
    session: Option<String>,
    difficulty: Difficulty,
    image: Option<&Path>,
) -> Result<()> {
    config.require_api_key()?;

    let conn = crate::db::open_database(config.resolved_db_path())?;
    let db = Arc::new(Mutex::new(conn));
    let model = Arc::new(GeminiClient::new(&config.model)?);
    let service = ChatService::new(Arc::clone(&db), model, config.model.clone());

    let session_id = match session {
        Some(id) => {
            let lookup = id.clone();
            let history = {
                let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
                anyhow::ensure!(
                    crate::store::sessions::get_session(&conn, &lookup)?.is_some(),
                    "session {lookup} not found"
                );
                messages::list_messages(&conn, &lookup)?
            };
            for message in history {
                let who = match message.role {
                    Role::User => "you",
                    Role::Model => "suzanne",
                };
                let body = match message.kind {
                    MessageKind::Image => "[image]".to_string(),
                    MessageKind::Text => message.content,
                };
                println!("{who}> {body}");
            }
            id
        }
        None => {
            let session = service.start_session(None).await?;
            let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            if let Some(greeting) = messages::list_messages(&conn, &session.id)?.first() {
                println!("suzanne> {}", greeting.content);
            }
            session.id
        }
    };

    let mut pending_image = image.map(image_data_url).transpose()?;
    if pending_image.is_some() {
        println!("(image attached to your next message)");
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text == "/quit" || text == "/exit" {
            break;
        }
        if text.is_empty() && pending_image.is_none() {
            continue;
        }

        let turn = ChatTurn {
            session_id: Some(session_id.clone()),
            text: text.to_string(),
            image_data_url: pending_image.take(),
            difficulty,
        };

        let spinner = thinking_spinner();
        let result = service.send_message(turn).await;
        spinner.finish_and_clear();

        match result {
            Ok(reply) => {
                println!("suzanne> {}", reply.reply);
                for fact in reply.saved_facts {
                    println!("  (remembered: {fact})");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    println!("Session saved as {session_id}");
    Ok(())
}

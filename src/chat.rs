//! Text chat turns: persist, prompt, remember, reply.
//!
//! [`ChatService`] runs one exchange at a time against a [`ChatModel`],
//! storing both sides of the conversation and any facts the model asks to
//! save.

use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::llm::prompt::{self, Difficulty, SAVE_FACT_TOOL};
use crate::llm::{ChatModel, Content, GenerateRequest, LlmError, Part};
use crate::store::types::{Message, MessageKind, NewMessage, Role, Session};
use crate::store::{facts, messages, sessions, StoreError};

/// Text sent in place of an empty prompt when only an image is attached.
pub const IMAGE_ONLY_PROMPT: &str = "Please solve this problem.";
/// How image messages appear in the history sent to the model.
pub const IMAGE_HISTORY_TEXT: &str = "User uploaded an image.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message must have text or an image")]
    EmptyTurn,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("{0}")]
    Internal(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// One user turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Existing session to continue. A new one is started when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub text: String,
    /// `data:<mime>;base64,<payload>`
    #[serde(default)]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub reply: String,
    /// Facts the model saved while answering.
    #[serde(default)]
    pub saved_facts: Vec<String>,
}

/// Split a `data:` URL into MIME type and base64 payload.
pub fn parse_data_url(url: &str) -> ChatResult<(String, String)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ChatError::InvalidImage("expected a data: URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ChatError::InvalidImage("missing ',' in data URL".into()))?;
    if payload.is_empty() {
        return Err(ChatError::InvalidImage("empty image payload".into()));
    }
    let mime = meta
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("image/png");
    Ok((mime.to_string(), payload.to_string()))
}

fn default_session_name() -> String {
    format!("Chat {}", chrono::Local::now().format("%Y-%m-%d %H:%M"))
}

fn history_contents(history: &[Message]) -> Vec<Content> {
    history
        .iter()
        .map(|m| {
            let text = match m.kind {
                MessageKind::Image => IMAGE_HISTORY_TEXT.to_string(),
                MessageKind::Text => m.content.clone(),
            };
            match m.role {
                Role::User => Content::user(vec![Part::text(text)]),
                Role::Model => Content::model(vec![Part::text(text)]),
            }
        })
        .collect()
}

pub struct ChatService {
    db: Arc<Mutex<Connection>>,
    model: Arc<dyn ChatModel>,
    config: ModelConfig,
}

impl ChatService {
    pub fn new(db: Arc<Mutex<Connection>>, model: Arc<dyn ChatModel>, config: ModelConfig) -> Self {
        Self { db, model, config }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> ChatResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> ChatResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| ChatError::Internal(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ChatError::Internal(format!("db task failed: {e}")))?
    }

    fn pick_greeting(&self) -> Option<String> {
        self.config.greetings.choose(&mut rand::thread_rng()).cloned()
    }

    /// Create a session and open it with a greeting from the model.
    pub async fn start_session(&self, name: Option<String>) -> ChatResult<Session> {
        let id = uuid::Uuid::now_v7().to_string();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(default_session_name);
        let greeting = self.pick_greeting();

        let session = self
            .with_db(move |conn| {
                let session = sessions::create_session(conn, &id, &name)?;
                if let Some(greeting) = greeting {
                    messages::append_message(conn, &NewMessage::text(&id, Role::Model, greeting))?;
                }
                Ok(session)
            })
            .await?;

        tracing::info!(session_id = %session.id, name = %session.name, "session started");
        Ok(session)
    }

    /// Handle one user turn and return the model's reply.
    pub async fn send_message(&self, turn: ChatTurn) -> ChatResult<ChatReply> {
        // 1. Validate
        let text = turn.text.trim().to_string();
        let image = turn
            .image_data_url
            .filter(|url| !url.trim().is_empty())
            .map(|url| parse_data_url(&url).map(|parsed| (url, parsed)))
            .transpose()?;
        if text.is_empty() && image.is_none() {
            return Err(ChatError::EmptyTurn);
        }

        // 2. Resolve session
        let session_id = match turn.session_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => self.start_session(None).await?.id,
        };

        tracing::info!(
            session_id = %session_id,
            text_len = text.len(),
            has_image = image.is_some(),
            difficulty = %turn.difficulty,
            "chat turn"
        );

        // 3. Load context and persist the user message
        let user_message = match &image {
            Some((url, _)) => NewMessage {
                session_id: session_id.clone(),
                role: Role::User,
                content: url.clone(),
                kind: MessageKind::Image,
            },
            None => NewMessage::text(&session_id, Role::User, &text),
        };
        let sid = session_id.clone();
        let (known_facts, history) = self
            .with_db(move |conn| {
                let known: Vec<String> = facts::list_facts(conn)?
                    .into_iter()
                    .map(|f| f.fact)
                    .collect();
                let history = messages::list_messages(conn, &sid)?;
                messages::append_message(conn, &user_message)?;
                Ok((known, history))
            })
            .await?;

        // 4. Build the request
        let instruction = prompt::system_instruction(&self.config.persona, &known_facts, turn.difficulty);
        let mut contents = Vec::with_capacity(history.len() + 2);
        contents.push(Content::user(vec![Part::text(instruction)]));
        contents.extend(history_contents(&history));

        let prompt_text = if text.is_empty() {
            IMAGE_ONLY_PROMPT.to_string()
        } else {
            text
        };
        let mut parts = vec![Part::text(prompt_text)];
        if let Some((_, (mime, data))) = image {
            parts.push(Part::inline(mime, data));
        }
        contents.push(Content::user(parts));

        let request = GenerateRequest {
            contents,
            tools: vec![prompt::save_fact_tool()],
        };

        // 5. Call the model
        let response = self.model.generate(&request).await?;

        // 6. Store facts and the reply
        let new_facts: Vec<String> = response
            .function_calls()
            .into_iter()
            .filter(|call| call.name == SAVE_FACT_TOOL)
            .filter_map(|call| call.args.get("fact").and_then(|v| v.as_str()))
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let reply = {
            let text = response.text();
            if text.trim().is_empty() {
                self.config.fallback_reply.clone()
            } else {
                text
            }
        };

        let sid = session_id.clone();
        let reply_for_db = reply.clone();
        let facts_for_db = new_facts.clone();
        self.with_db(move |conn| {
            for fact in &facts_for_db {
                facts::save_fact(conn, fact)?;
            }
            messages::append_message(conn, &NewMessage::text(&sid, Role::Model, reply_for_db))?;
            Ok(())
        })
        .await?;

        tracing::info!(
            session_id = %session_id,
            reply_len = reply.len(),
            facts_saved = new_facts.len(),
            "chat reply stored"
        );

        Ok(ChatReply {
            session_id,
            reply,
            saved_facts: new_facts,
        })
    }
}

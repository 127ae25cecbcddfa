//! Text chat with the hosted model.
//!
//! [`ChatModel`] is the seam between [`crate::chat::ChatService`] and the
//! provider; [`gemini::GeminiClient`] is the real implementation.

pub mod gemini;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::{Content, FunctionCall, GeminiClient, GenerateRequest, GenerateResponse, Part};

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected model response: {0}")]
    Decode(String),

    #[error("model not configured: {0}")]
    NotConfigured(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// One non-streaming generation round trip.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> LlmResult<GenerateResponse>;
}

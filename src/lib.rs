//! Suzanne: a personal AI chat companion with long-term memory and
//! realtime voice calls.
//!
//! Text chat goes through the Gemini `generateContent` API; every exchange
//! is stored in SQLite along with the facts the model chooses to remember.
//! Voice calls stream microphone audio to the Gemini Live API and play the
//! spoken reply back as it arrives.
//!
//! | Call state | Meaning |
//! |------------|---------|
//! | **Idle** | No call; `connect()` is accepted |
//! | **Connecting** | Microphone held, live session opening |
//! | **Active** | Audio flowing both ways |
//! | **Failed** | Transient: error reported, returning to Idle |
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) for sessions, messages and facts
//! - **Chat**: REST calls with a `save_fact` tool for long-term memory
//! - **Voice**: cpal capture and playback, PCM16 over a websocket
//! - **Server**: axum REST API with optional static front end
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`store`]: Sessions, messages and facts
//! - [`llm`]: Model client, prompt and tool declarations
//! - [`chat`]: One text chat turn end to end
//! - [`api`]: REST handlers and router
//! - [`voice`]: Capture, transport, playback queue and call orchestration

pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod llm;
pub mod store;
pub mod voice;

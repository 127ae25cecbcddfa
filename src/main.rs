mod api;
mod chat;
mod cli;
mod config;
mod db;
mod llm;
mod server;
mod store;
mod voice;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::llm::prompt::Difficulty;

#[derive(Parser)]
#[command(name = "suzanne", version, about = "Personal AI chat companion with memory and voice calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server (REST API and optional static front end)
    Serve,
    /// Chat with Suzanne in the terminal
    Chat {
        /// Continue an existing session instead of starting a new one
        #[arg(long)]
        session: Option<String>,
        /// Solution detail: easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: Difficulty,
        /// Attach an image to the first message
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Start a realtime voice call (Ctrl-C to hang up)
    Call,
    /// Browse or delete chat sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Inspect or add long-term facts
    Facts {
        #[command(subcommand)]
        action: FactsAction,
    },
    /// Check database, API key and audio devices
    Doctor,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List sessions, newest first
    List,
    /// Print a session's transcript
    Show { id: String },
    /// Delete a session and its messages
    Delete { id: String },
}

#[derive(Subcommand)]
enum FactsAction {
    /// List facts, newest first
    List,
    /// Remember a new fact
    Add { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::SuzanneConfig::load()?;

    // Log to stderr so stdout stays clean for chat output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Chat {
            session,
            difficulty,
            image,
        } => {
            cli::chat(&config, session, difficulty, image.as_deref()).await?;
        }
        Command::Call => {
            cli::call(&config).await?;
        }
        Command::Sessions { action } => match action {
            SessionsAction::List => cli::sessions::list(&config)?,
            SessionsAction::Show { id } => cli::sessions::show(&config, &id)?,
            SessionsAction::Delete { id } => cli::sessions::delete(&config, &id)?,
        },
        Command::Facts { action } => match action {
            FactsAction::List => cli::facts::list(&config)?,
            FactsAction::Add { text } => cli::facts::add(&config, &text)?,
        },
        Command::Doctor => {
            cli::doctor(&config)?;
        }
    }

    Ok(())
}

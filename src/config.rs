use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SuzanneConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Pre-built front end to serve at `/`. Nothing is served when unset.
    pub static_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub request_timeout_secs: u64,
    /// Reply stored when the model answers with a function call and no text.
    pub fallback_reply: String,
    pub persona: String,
    pub greetings: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VoiceConfig {
    pub live_url: String,
    pub live_model: String,
    pub voice_name: String,
    pub sample_rate: u32,
    pub block_size: usize,
    pub connect_timeout_secs: u64,
}

impl Default for SuzanneConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            model: ModelConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            log_level: "info".into(),
            static_dir: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_suzanne_dir()
            .join("suzanne.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            chat_model: "gemini-3-flash-preview".into(),
            request_timeout_secs: 120,
            fallback_reply: "Got it! I'll remember that.".into(),
            persona: "You are Suzanne, the user's personal AI assistant and best friend. \
                      Keep answers short and friendly. Use the save_fact tool to remember \
                      important things the user tells you."
                .into(),
            greetings: vec![
                "Hi, what's up?".into(),
                "Hey bestie, what's up?".into(),
                "Yo! What are we working on today?".into(),
            ],
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into(),
            live_model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice_name: "Kore".into(),
            sample_rate: crate::voice::SAMPLE_RATE,
            block_size: crate::voice::BLOCK_SIZE,
            connect_timeout_secs: 15,
        }
    }
}

/// Returns `~/.suzanne/`
pub fn default_suzanne_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".suzanne")
}

/// Returns the default config file path: `~/.suzanne/config.toml`
pub fn default_config_path() -> PathBuf {
    default_suzanne_dir().join("config.toml")
}

impl SuzanneConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SuzanneConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (SUZANNE_DB, SUZANNE_LOG_LEVEL, SUZANNE_PORT, GEMINI_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SUZANNE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SUZANNE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("SUZANNE_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid SUZANNE_PORT"),
            }
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.model.api_key = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Fail early with a readable message when no API key is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        anyhow::ensure!(
            !self.model.api_key.trim().is_empty(),
            "no API key configured: set GEMINI_API_KEY or model.api_key in {}",
            default_config_path().display()
        );
        Ok(&self.model.api_key)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SuzanneConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.voice.sample_rate, 16000);
        assert_eq!(config.voice.block_size, 4096);
        assert_eq!(config.voice.voice_name, "Kore");
        assert!(config.storage.db_path.ends_with("suzanne.db"));
        assert!(!config.model.greetings.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 8080

[storage]
db_path = "/tmp/test.db"

[model]
chat_model = "gemini-test"
fallback_reply = "noted"
"#;
        let config: SuzanneConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.model.chat_model, "gemini-test");
        assert_eq!(config.model.fallback_reply, "noted");
        // defaults still apply for unset fields
        assert_eq!(config.voice.connect_timeout_secs, 15);
        assert_eq!(config.model.request_timeout_secs, 120);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SuzanneConfig::default();
        std::env::set_var("SUZANNE_DB", "/tmp/override.db");
        std::env::set_var("SUZANNE_LOG_LEVEL", "trace");
        std::env::set_var("SUZANNE_PORT", "4242");
        std::env::set_var("GEMINI_API_KEY", "test-key");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.server.port, 4242);
        assert_eq!(config.model.api_key, "test-key");

        // Clean up
        std::env::remove_var("SUZANNE_DB");
        std::env::remove_var("SUZANNE_LOG_LEVEL");
        std::env::remove_var("SUZANNE_PORT");
        std::env::remove_var("GEMINI_API_KEY");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = SuzanneConfig::default();
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_tilde("~/x/y.db");
        assert!(expanded.ends_with("x/y.db"));
        assert_eq!(expand_tilde("/abs/path.db"), PathBuf::from("/abs/path.db"));
    }
}

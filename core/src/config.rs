use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Directories {
    /// SQLite file holding user info, chat history, summaries and vectors.
    /// Relative paths resolve against the config file's directory.
    pub db_path: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/chatbot.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub chat_model: String,
    pub summary_model: String,
    pub rag_model: String,
    pub temperature: f32,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o-mini".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            rag_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_base: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatHistoryConfig {
    pub max_history_pairs: usize,
    pub max_characters: usize,
    /// Token ceiling for the in-memory window before it gets compressed.
    pub max_tokens: usize,
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self {
            max_history_pairs: 2,
            max_characters: 1000,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_function_calls: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_function_calls: 3 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    pub collection_name: String,
    pub embedding_model: String,
    pub k: usize,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            collection_name: "chat_history".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            k: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directories: Directories,
    pub llm: LlmConfig,
    pub chat_history: ChatHistoryConfig,
    pub agent: AgentConfig,
    pub vectordb: VectorDbConfig,
    pub server: ServerConfig,
}

impl Config {
    /// `~/.mnemo/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("failed to determine home directory")?;
        Ok(home.join(".mnemo").join("config.toml"))
    }

    /// Parse a TOML config file. Relative paths inside it are resolved
    /// against the file's parent directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let mut cfg = Self::from_toml_str(&text)
            .with_context(|| format!("invalid config at {}", path.display()))?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    /// (resolved against the would-be config directory).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let mut cfg = Self::default();
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        Ok(cfg)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.directories.db_path.is_relative() {
            self.directories.db_path = base.join(&self.directories.db_path);
        }
    }

    /// Reject settings the chat loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chat_history.max_history_pairs == 0 {
            bail!("chat_history.max_history_pairs must be at least 1");
        }
        if self.vectordb.k == 0 {
            bail!("vectordb.k must be at least 1");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!(
                "llm.temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            );
        }
        let models = [
            ("llm.chat_model", &self.llm.chat_model),
            ("llm.summary_model", &self.llm.summary_model),
            ("llm.rag_model", &self.llm.rag_model),
            ("vectordb.embedding_model", &self.vectordb.embedding_model),
        ];
        for (key, value) in models {
            if value.trim().is_empty() {
                bail!("{key} must not be empty");
            }
        }
        Ok(())
    }

    /// API key from the environment. Never read from the config file.
    pub fn api_key() -> Option<String> {
        std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
    }

    /// Base URL for the model API; `OPENAI_BASE_URL` wins over the file.
    pub fn api_base(&self) -> String {
        std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.llm.api_base.clone())
    }
}

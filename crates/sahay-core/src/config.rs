use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SahayError};

/// Top-level configuration for the Sahay kiosk.
///
/// Loaded from `~/.sahay/config.toml` by default. Each section corresponds
/// to one component of the interaction orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SahayConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl SahayConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SahayConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SahayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite knowledge base and session archive.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.sahay/data".to_string(),
            log_level: "info".to_string(),
            port: 7030,
        }
    }
}

/// Presence detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Window for suppressing presence signal flicker, in milliseconds.
    pub debounce_ms: u64,
    /// Seconds without interaction and without presence before an active
    /// session is closed.
    pub idle_timeout_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            idle_timeout_secs: 10,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start a session automatically when an interaction arrives with no
    /// active session, instead of rejecting it.
    pub start_on_first_input: bool,
    /// Consecutive failed turns before the session is closed.
    pub max_consecutive_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_on_first_input: true,
            max_consecutive_failures: 3,
        }
    }
}

/// Retrieval engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding dimensionality shared by all documents.
    pub embedding_dim: usize,
    /// Number of documents retrieved per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a document to be considered relevant.
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 384,
            top_k: 3,
            min_similarity: 0.3,
        }
    }
}

/// Conversation context window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of recent turns retained per session.
    pub max_turns: usize,
    /// Character budget for the rendered context block.
    pub char_budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 4,
            char_budget: 2000,
        }
    }
}

/// Pipeline coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timeout budget for the speech recognizer, in milliseconds.
    pub asr_timeout_ms: u64,
    /// Timeout budget for the language model, in milliseconds.
    pub llm_timeout_ms: u64,
    /// Timeout budget for speech synthesis, in milliseconds.
    pub tts_timeout_ms: u64,
    /// Backoff before the single retry of a failed collaborator call,
    /// in milliseconds.
    pub retry_backoff_ms: u64,
    /// Maximum tokens requested from the language model.
    pub max_tokens: u32,
    /// Fixed response used when generation fails.
    pub fallback_text: String,
    /// System instructions placed at the top of every prompt.
    pub system_instructions: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            asr_timeout_ms: 10_000,
            llm_timeout_ms: 30_000,
            tts_timeout_ms: 10_000,
            retry_backoff_ms: 250,
            max_tokens: 150,
            fallback_text:
                "I'm sorry, I encountered an error processing your request. Please try again."
                    .to_string(),
            system_instructions: "You are a helpful kiosk assistant. Answer briefly using the \
                                  provided knowledge base excerpts when they are relevant."
                .to_string(),
        }
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LabpilotError, Result};

/// Top-level configuration for Labpilot.
///
/// Loaded from `~/.labpilot/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabpilotConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl LabpilotConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LabpilotConfig = toml::from_str(&content)?;
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
            toml::to_string_pretty(self).map_err(|e| LabpilotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 8000,
        }
    }
}

/// Conversational endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the chat endpoint accepts messages.
    pub enabled: bool,
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Number of prior messages handed to the language model as context.
    pub history_window: usize,
    /// Maximum number of rows attached to a chat reply's table.
    pub max_table_rows: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_length: 4000,
            history_window: 20,
            max_table_rows: 50,
        }
    }
}

/// Document search and ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results when the caller does not ask for a specific count.
    pub default_top_k: usize,
    /// Upper bound on requested result counts.
    pub max_top_k: usize,
    /// Embedding dimension. Must match the remote model's output size.
    pub embedding_dim: usize,
    /// "lexical" for the built-in offline embedder, or "openai-compatible".
    pub embedding_provider: String,
    /// Embeddings endpoint for the remote provider.
    pub embedding_url: String,
    /// Embedding model name sent to the remote provider.
    pub embedding_model: String,
    /// Environment variable holding the embedding API key.
    pub embedding_api_key_env: String,
    /// Embedding request timeout in seconds.
    pub embedding_timeout_secs: u64,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
            embedding_dim: 384,
            embedding_provider: "lexical".to_string(),
            embedding_url: "https://api.mistral.ai/v1/embeddings".to_string(),
            embedding_model: "mistral-embed".to_string(),
            embedding_api_key_env: "MISTRAL_API_KEY".to_string(),
            embedding_timeout_secs: 30,
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Tabular data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Rows returned in an upload preview.
    pub preview_rows: usize,
    /// Maximum rows returned by the direct data operations.
    pub max_result_rows: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            preview_rows: 5,
            max_result_rows: 100,
        }
    }
}

/// Retention limits. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Datasets kept before the oldest is evicted.
    pub max_datasets: Option<usize>,
    /// Documents kept before the oldest is evicted.
    pub max_documents: Option<usize>,
    /// Messages kept per session history.
    pub max_history_messages: Option<usize>,
    /// Idle minutes after which a session is dropped.
    pub session_idle_minutes: Option<u32>,
}

/// Language-model collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "rules" for the built-in deterministic model, or "openai-compatible".
    pub provider: String,
    /// Chat-completions endpoint for the remote provider.
    pub base_url: String,
    /// Model name sent to the remote provider.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "rules".to_string(),
            base_url: "https://api.mistral.ai/v1/chat/completions".to_string(),
            model: "mistral-large-latest".to_string(),
            api_key_env: "MISTRAL_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

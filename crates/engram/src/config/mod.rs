use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};

/// Main configuration structure for the memory subsystem
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Short-term buffer configuration
    #[serde(default)]
    pub short_term: ShortTermConfig,
    /// Durable record store configuration
    #[serde(default)]
    pub record: RecordConfig,
    /// Semantic index configuration
    #[serde(default)]
    pub semantic: SemanticConfig,
    /// Text generation backend configuration (summarization)
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Message count at which summarization starts firing
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term: ShortTermConfig::default(),
            record: RecordConfig::default(),
            semantic: SemanticConfig::default(),
            generator: GeneratorConfig::default(),
            summarize_threshold: default_summarize_threshold(),
        }
    }
}

impl MemoryConfig {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MemoryError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

fn default_summarize_threshold() -> u32 {
    20
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

/// Short-term buffer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShortTermConfig {
    /// Maximum messages kept per user before oldest-first eviction
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for ShortTermConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

fn default_max_messages() -> usize {
    10
}

/// Durable record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecordConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("memory.db")
}

/// Semantic index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticConfig {
    /// Enable the semantic index; when false the index is a permanent no-op
    #[serde(default = "default_semantic_enabled")]
    pub enabled: bool,
    /// Directory for the vector store data
    #[serde(default = "default_index_dir")]
    pub data_dir: PathBuf,
    /// Number of results returned by retrieval queries
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum similarity score for retrieval hits (0.0-1.0)
    #[serde(default)]
    pub min_score: f32,
    /// Messages per chunk when indexing a conversation window
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: default_semantic_enabled(),
            data_dir: default_index_dir(),
            top_k: default_top_k(),
            min_score: 0.0,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_semantic_enabled() -> bool {
    true
}

fn default_index_dir() -> PathBuf {
    default_data_dir().join("index")
}

fn default_top_k() -> usize {
    3
}

fn default_chunk_size() -> usize {
    3
}

/// Text generation backend configuration for summarization
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// OpenAI-compatible API endpoint URL
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model identifier for the generation API
    #[serde(default = "default_generator_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key_env: default_api_key_env(),
            model: default_generator_model(),
            timeout_secs: default_generator_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "ENGRAM_API_KEY".to_string()
}

fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generator_timeout_secs() -> u64 {
    30
}

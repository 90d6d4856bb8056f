//! Text generation seam used by the summarizer
//!
//! The subsystem issues single-shot prompts and reads back plain text; no
//! streaming and no multi-turn state is held here.

use async_trait::async_trait;

/// Errors from a generation backend
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for generation operations
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Trait for text generation backends
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

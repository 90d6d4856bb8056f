//! Conversation summarization and fact extraction
//!
//! The summarizer is stateless: each operation renders its message window
//! as a transcript, issues exactly one generation call, and post-processes
//! the response. Generation failures never erase prior memory; `summarize`
//! falls back to the existing summary and `extract_facts` to an empty list.

pub mod prompts;
pub mod provider;
pub mod remote;

pub use provider::{GeneratorError, TextGenerator};
pub use remote::OpenAiGenerator;

use std::sync::Arc;

use tracing::warn;

use crate::memory::types::{ChatMessage, render_transcript};

/// Maximum facts extracted per pass
const MAX_EXTRACTED_FACTS: usize = 3;

/// Sentinel the extraction prompt uses for "no personal information"
const NO_FACTS_SENTINEL: &str = "none";

/// Stateless summarization over a generation backend
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
}

impl Summarizer {
    /// Create a summarizer over an injected generation backend
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Produce an updated summary for a message window.
    ///
    /// The existing summary is prepended as framing context when non-empty.
    /// On any generation failure the existing summary is returned unchanged.
    pub async fn summarize(&self, messages: &[ChatMessage], existing_summary: &str) -> String {
        if messages.is_empty() {
            return existing_summary.to_string();
        }

        let mut conversation = render_transcript(messages);
        if !existing_summary.is_empty() {
            conversation = format!("[Previous summary: {existing_summary}]\n\n{conversation}");
        }

        let prompt = prompts::SUMMARIZE_PROMPT.replace("{conversation}", &conversation);

        match self.generator.generate(&prompt).await {
            Ok(response) => response.trim().to_string(),
            Err(e) => {
                warn!(
                    backend = self.generator.name(),
                    error = %e,
                    "summarization failed, keeping existing summary"
                );
                existing_summary.to_string()
            }
        }
    }

    /// Extract at most three atomic facts from a message window.
    ///
    /// A blank response or the literal `none` sentinel yields an empty list,
    /// as does any generation failure.
    pub async fn extract_facts(&self, messages: &[ChatMessage]) -> Vec<String> {
        if messages.is_empty() {
            return Vec::new();
        }

        let conversation = render_transcript(messages);
        let prompt = prompts::EXTRACT_FACTS_PROMPT.replace("{conversation}", &conversation);

        match self.generator.generate(&prompt).await {
            Ok(response) => parse_facts(&response),
            Err(e) => {
                warn!(
                    backend = self.generator.name(),
                    error = %e,
                    "fact extraction failed"
                );
                Vec::new()
            }
        }
    }
}

/// Parse an extraction response into facts, one per line.
///
/// Leading bullet and number markers are stripped and the result is
/// truncated to [`MAX_EXTRACTED_FACTS`] entries.
fn parse_facts(response: &str) -> Vec<String> {
    let response = response.trim();
    if response.is_empty() || response.eq_ignore_ascii_case(NO_FACTS_SENTINEL) {
        return Vec::new();
    }

    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c == '•' || c == '-' || c == '*' || c == '.' || c == ')' || c.is_ascii_digit()
                })
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case(NO_FACTS_SENTINEL))
        .take(MAX_EXTRACTED_FACTS)
        .collect()
}

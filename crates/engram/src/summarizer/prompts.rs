//! Prompt templates for summarization and fact extraction
//!
//! Both templates take a `{conversation}` placeholder holding the rendered
//! role-labeled transcript.

/// Template for updating the running conversation summary
pub const SUMMARIZE_PROMPT: &str = r#"Summarize the following conversation concisely, covering:
1. The main topics discussed
2. Key information the user may care about
3. Any user preferences or facts worth remembering

Conversation:
{conversation}

Summarize in 1-3 sentences:"#;

/// Template for extracting atomic user facts
///
/// The model is instructed to answer with the literal sentinel `none` when
/// the conversation carries no personal information.
pub const EXTRACT_FACTS_PROMPT: &str = r#"Extract important information about the user from the following conversation (preferences, habits, personal circumstances, etc.).
Write one item per line and extract at most the 3 most important items.
If there is no clear personal information, respond with "none".

Conversation:
{conversation}

User information:"#;

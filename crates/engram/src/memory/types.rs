//! Message and document types shared across the memory tiers
//!
//! Each tier stores its own representation of a message: the buffer holds
//! [`TurnMessage`]s, the record store persists role/content rows, and the
//! semantic index holds rendered [`SemanticDocument`] chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl Role {
    /// Wire-format string for the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Display label used in rendered transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    /// Parse a stored role string; unknown values fall back to `User`
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("assistant") {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

/// A single message held in the short-term buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMessage {
    /// Role of the speaker
    pub role: Role,
    /// Content of the message
    pub content: String,
    /// When the message was recorded
    pub timestamp: DateTime<Utc>,
}

impl TurnMessage {
    /// Create a new message with the current timestamp
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Role/content pair handed to the generation backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the speaker
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new role/content pair
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&TurnMessage> for ChatMessage {
    fn from(msg: &TurnMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Render messages as a role-labeled transcript, one line per message
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A text chunk stored in the semantic index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticDocument {
    /// Identifier derived from user, content and insertion time
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Rendered chunk text
    pub content: String,
    /// Vector embedding of the content
    pub embedding: Vec<f32>,
    /// When the chunk was indexed
    pub timestamp: DateTime<Utc>,
    /// Starting offset of the chunk within its source window
    pub chunk_index: i32,
}

impl SemanticDocument {
    /// Create a document with an id deterministic from (user, content, time)
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        chunk_index: i32,
    ) -> Self {
        let user_id = user_id.into();
        let content = content.into();
        let timestamp = Utc::now();
        let id = Uuid::new_v5(
            &Uuid::NAMESPACE_OID,
            format!("{}:{}:{}", user_id, content, timestamp.timestamp_micros()).as_bytes(),
        )
        .to_string();

        Self {
            id,
            user_id,
            content,
            embedding,
            timestamp,
            chunk_index,
        }
    }
}

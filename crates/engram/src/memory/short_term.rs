//! Short-term buffer holding the recent conversation window per user
//!
//! Bounded in-process queues with oldest-first eviction. No persistence:
//! a process restart empties every buffer. Mutation is atomic per user;
//! unrelated users never contend beyond map shard locks.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::memory::types::{ChatMessage, Role, TurnMessage, render_transcript};

/// Per-user bounded message queues, oldest first
pub struct ShortTermBuffer {
    max_messages: usize,
    store: DashMap<String, VecDeque<TurnMessage>>,
}

impl ShortTermBuffer {
    /// Create a buffer keeping at most `max_messages` per user
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            store: DashMap::new(),
        }
    }

    /// Configured per-user capacity
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Append a message, evicting from the front once over capacity
    pub fn add(&self, user_id: &str, role: Role, content: impl Into<String>) {
        let mut entry = self.store.entry(user_id.to_string()).or_default();
        entry.push_back(TurnMessage::new(role, content));
        while entry.len() > self.max_messages {
            entry.pop_front();
        }
    }

    /// Messages for a user, oldest first, optionally only the most recent `limit`
    pub fn get(&self, user_id: &str, limit: Option<usize>) -> Vec<TurnMessage> {
        let Some(entry) = self.store.get(user_id) else {
            return Vec::new();
        };
        let messages = entry.value();
        let start = limit.map_or(0, |l| messages.len().saturating_sub(l));
        messages.iter().skip(start).cloned().collect()
    }

    /// Role/content pairs for the generation backend, oldest first
    pub fn get_for_llm(&self, user_id: &str, limit: Option<usize>) -> Vec<ChatMessage> {
        self.get(user_id, limit)
            .iter()
            .map(ChatMessage::from)
            .collect()
    }

    /// The recent window rendered as a role-labeled transcript
    pub fn get_formatted(&self, user_id: &str, limit: Option<usize>) -> String {
        render_transcript(&self.get_for_llm(user_id, limit))
    }

    /// Remove and return up to `count` messages from the front
    pub fn pop_oldest(&self, user_id: &str, count: usize) -> Vec<TurnMessage> {
        let Some(mut entry) = self.store.get_mut(user_id) else {
            return Vec::new();
        };
        let n = count.min(entry.len());
        entry.drain(..n).collect()
    }

    /// Remove and return the most recent message
    pub fn pop_last(&self, user_id: &str) -> Option<TurnMessage> {
        self.store.get_mut(user_id)?.pop_back()
    }

    /// Drop the user's queue entirely; absence is the cleared state
    pub fn clear(&self, user_id: &str) {
        self.store.remove(user_id);
    }

    /// Number of buffered messages for a user
    pub fn count(&self, user_id: &str) -> usize {
        self.store.get(user_id).map_or(0, |e| e.len())
    }

    /// Whether the user's queue is at capacity
    pub fn is_full(&self, user_id: &str) -> bool {
        self.count(user_id) >= self.max_messages
    }
}

//! Memory coordinator
//!
//! Orchestrates the three tiers: every incoming message lands in the
//! short-term buffer, recent exchanges are opportunistically indexed, and a
//! per-user counter drives the summarization cadence. `add_message`,
//! `get_context` and `clear` always complete for the caller; tier failures
//! are logged and degraded so the chat path is never blocked.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::memory::semantic::SemanticIndex;
use crate::memory::short_term::ShortTermBuffer;
use crate::memory::types::{ChatMessage, Role};
use crate::storage::record::RecordStore;
use crate::summarizer::Summarizer;

/// Messages per opportunistic indexing chunk (one user/assistant exchange)
const EXCHANGE_CHUNK_SIZE: usize = 2;

/// Minimum window length worth summarizing
const MIN_SUMMARY_WINDOW: usize = 4;

/// Summarization fires every this many messages once the floor is reached
const SUMMARIZE_CADENCE: u64 = 5;

/// Ceiling for the summarization floor, bounding unsummarized backlog
const SUMMARIZE_FLOOR_CAP: u32 = 10;

/// Read-only aggregate of a user's memory state
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    /// Messages currently buffered
    pub short_term_count: usize,
    /// Whether a long-term summary exists
    pub has_summary: bool,
    /// Number of stored facts
    pub fact_count: usize,
    /// Documents in the semantic index
    pub indexed_documents: usize,
    /// Lifetime message count since start or last clear
    pub total_messages: u64,
}

/// Coordinator over the short-term buffer, record store and semantic index
pub struct MemoryCoordinator {
    buffer: ShortTermBuffer,
    record: Arc<RecordStore>,
    index: SemanticIndex,
    summarizer: Option<Summarizer>,
    summarize_threshold: u32,
    chunk_size: usize,
    rag_top_k: usize,
    rag_min_score: f32,
    // Transient per-user message counts; restart resets the cadence,
    // an accepted tradeoff for keeping construction non-suspending.
    counters: DashMap<String, u64>,
    // Per-user ordering locks. Held across buffer mutation and the trigger
    // snapshot, released before generation calls so a slow backend never
    // serializes subsequent writes for the same user.
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryCoordinator {
    /// Build a coordinator from already-constructed tier instances.
    ///
    /// Without a summarizer the cadence never fires and long-term memory is
    /// only written through explicit settings/fact calls.
    pub fn new(
        config: &MemoryConfig,
        record: Arc<RecordStore>,
        index: SemanticIndex,
        summarizer: Option<Summarizer>,
    ) -> Self {
        Self {
            buffer: ShortTermBuffer::new(config.short_term.max_messages),
            record,
            index,
            summarizer,
            summarize_threshold: config.summarize_threshold,
            chunk_size: config.semantic.chunk_size,
            rag_top_k: config.semantic.top_k,
            rag_min_score: config.semantic.min_score,
            counters: DashMap::new(),
            user_locks: DashMap::new(),
        }
    }

    /// The short-term buffer, for owners that need to borrow messages
    pub fn buffer(&self) -> &ShortTermBuffer {
        &self.buffer
    }

    /// Ingest one message.
    ///
    /// Appends to the buffer, opportunistically indexes the latest exchange,
    /// advances the user's counter and runs a summarization pass when the
    /// cadence fires. Never fails; tier errors are logged and swallowed.
    pub async fn add_message(&self, user_id: &str, role: Role, content: &str) {
        let lock = self.user_lock(user_id);
        let guard = lock.lock().await;

        self.buffer.add(user_id, role, content);

        // Keep the index warm for retrieval before any summarization pass
        if !content.trim().is_empty() && self.index.enabled() {
            let recent = self.buffer.get_for_llm(user_id, Some(EXCHANGE_CHUNK_SIZE));
            if recent.len() >= EXCHANGE_CHUNK_SIZE {
                if let Err(e) = self
                    .index
                    .add_conversation(user_id, &recent, EXCHANGE_CHUNK_SIZE)
                    .await
                {
                    warn!(user_id, error = %e, "failed to index recent exchange");
                }
            }
        }

        let count = {
            let mut counter = self.counters.entry(user_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        let window = if self.should_summarize(count) {
            let window = self.buffer.get_for_llm(user_id, None);
            if window.len() < MIN_SUMMARY_WINDOW {
                debug!(user_id, count, "window too short, skipping summarization");
                None
            } else {
                Some(window)
            }
        } else {
            None
        };

        drop(guard);

        if let Some(messages) = window {
            if let Err(e) = self.run_summarization(user_id, &messages).await {
                warn!(user_id, error = %e, "summarization pass failed");
            }
        }
    }

    /// Cadence check: fires every [`SUMMARIZE_CADENCE`] messages once the
    /// count reaches `min(threshold, 10)`.
    fn should_summarize(&self, count: u64) -> bool {
        let floor = u64::from(self.summarize_threshold.min(SUMMARIZE_FLOOR_CAP));
        self.summarizer.is_some() && count >= floor && count % SUMMARIZE_CADENCE == 0
    }

    /// One summarization pass over a snapshotted window.
    ///
    /// An error anywhere leaves the buffer and counter untouched, so the
    /// next cadence tick retries with a larger window.
    async fn run_summarization(&self, user_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let Some(summarizer) = &self.summarizer else {
            return Ok(());
        };

        let existing = self.record.get_summary(user_id)?;
        let summary = summarizer.summarize(messages, &existing).await;
        self.record.update_summary(user_id, &summary)?;

        for fact in summarizer.extract_facts(messages).await {
            self.record.add_fact(user_id, &fact)?;
        }

        if self.index.enabled() {
            self.index
                .add_conversation(user_id, messages, self.chunk_size)
                .await?;
        }

        self.record.save_conversation(user_id, messages)?;

        debug!(user_id, window = messages.len(), "summarization pass complete");
        Ok(())
    }

    /// Assemble the context string for the next generation call.
    ///
    /// Sections in priority order: long-term summary, known facts, semantic
    /// retrieval (when `include_rag` and the query is non-blank), recent
    /// conversation. Empty sections are omitted; an empty string means no
    /// tier had content. Never fails.
    pub async fn get_context(&self, user_id: &str, query: &str, include_rag: bool) -> String {
        let mut parts = Vec::new();

        match self.record.get_user_info(user_id) {
            Ok(info) => {
                if !info.summary.is_empty() {
                    parts.push(format!("[User background]\n{}", info.summary));
                }
                if !info.facts.is_empty() {
                    let facts = info
                        .facts
                        .iter()
                        .map(|f| format!("- {f}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    parts.push(format!("[Known facts]\n{facts}"));
                }
            }
            Err(e) => warn!(user_id, error = %e, "failed to read user record"),
        }

        if include_rag && self.index.enabled() && !query.trim().is_empty() {
            match self
                .index
                .search_formatted(user_id, query, self.rag_top_k, self.rag_min_score)
                .await
            {
                Ok(block) if !block.is_empty() => parts.push(block),
                Ok(_) => {}
                Err(e) => warn!(user_id, error = %e, "semantic search failed"),
            }
        }

        let recent = self.buffer.get_formatted(user_id, None);
        if !recent.is_empty() {
            parts.push(format!("[Recent conversation]\n{recent}"));
        }

        parts.join("\n\n")
    }

    /// The buffered window as role/content pairs for the generation call
    pub fn get_messages_for_llm(&self, user_id: &str) -> Vec<ChatMessage> {
        self.buffer.get_for_llm(user_id, None)
    }

    /// Reset every tier for one user.
    ///
    /// Sub-clears are independent; one tier failing is logged and does not
    /// block the others. The counter entry is removed, not zeroed.
    pub async fn clear(&self, user_id: &str) {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.buffer.clear(user_id);
        self.counters.remove(user_id);

        if let Err(e) = self.record.clear_user(user_id) {
            warn!(user_id, error = %e, "failed to clear user record");
        }

        match self.index.delete_user(user_id).await {
            Ok(removed) => debug!(user_id, removed, "cleared indexed documents"),
            Err(e) => warn!(user_id, error = %e, "failed to clear indexed documents"),
        }
    }

    /// Read-only aggregate of a user's memory state
    pub async fn get_stats(&self, user_id: &str) -> MemoryStats {
        let info = self.record.get_user_info(user_id).unwrap_or_else(|e| {
            warn!(user_id, error = %e, "failed to read user record");
            Default::default()
        });

        let indexed_documents = self.index.count(Some(user_id)).await.unwrap_or_else(|e| {
            warn!(user_id, error = %e, "failed to count indexed documents");
            0
        });

        MemoryStats {
            short_term_count: self.buffer.count(user_id),
            has_summary: !info.summary.is_empty(),
            fact_count: info.facts.len(),
            indexed_documents,
            total_messages: self.counters.get(user_id).map_or(0, |c| *c),
        }
    }

    /// A user setting, falling back to `default` when unset or unreadable
    pub fn get_setting(&self, user_id: &str, key: &str, default: Value) -> Value {
        match self.record.get_setting(user_id, key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(user_id, key, error = %e, "failed to read setting");
                default
            }
        }
    }

    /// Merge one setting into the user's settings map
    pub fn set_setting(&self, user_id: &str, key: &str, value: Value) -> Result<()> {
        self.record.set_setting(user_id, key, value)
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

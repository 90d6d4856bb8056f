//! Semantic index over conversation chunks
//!
//! The index is a capability behind the [`IndexBackend`] trait: the real
//! [`LanceBackend`] pairs a LanceDB table with a text embedder, while
//! [`DisabledBackend`] is the null object used when the vector store or the
//! embedding model cannot be initialized. Construction never fails; a
//! failed backend flips the index to disabled for its whole lifetime and
//! every operation becomes an empty no-op.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::SemanticConfig;
use crate::embedding::{FastEmbedder, TextEmbedder};
use crate::error::Result;
use crate::memory::types::{ChatMessage, SemanticDocument, render_transcript};
use crate::storage::lance::DocumentStore;

/// One retrieval hit with its normalized similarity score
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Rendered chunk text
    pub content: String,
    /// Similarity in [0, 1], derived from cosine distance as `1 - d/2`
    pub score: f32,
    /// When the chunk was indexed
    pub timestamp: DateTime<Utc>,
    /// Starting offset of the chunk within its source window
    pub chunk_index: i32,
}

/// Fixed capability surface of a vector index backend
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Index one chunk, returning its document id
    async fn add(&self, user_id: &str, content: &str, chunk_index: i32) -> Result<Option<String>>;

    /// Nearest-neighbor search scoped to one user
    async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    /// Remove every document for a user, returning the count removed
    async fn delete_user(&self, user_id: &str) -> Result<usize>;

    /// Total documents, optionally filtered to one user
    async fn count(&self, user_id: Option<&str>) -> Result<usize>;
}

/// Null-object backend used while the index is disabled
struct DisabledBackend;

#[async_trait]
impl IndexBackend for DisabledBackend {
    async fn add(&self, _user_id: &str, _content: &str, _chunk_index: i32) -> Result<Option<String>> {
        Ok(None)
    }

    async fn search(&self, _user_id: &str, _query: &str, _limit: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }

    async fn delete_user(&self, _user_id: &str) -> Result<usize> {
        Ok(0)
    }

    async fn count(&self, _user_id: Option<&str>) -> Result<usize> {
        Ok(0)
    }
}

/// LanceDB-backed index pairing a document table with an embedder
pub struct LanceBackend {
    store: DocumentStore,
    embedder: Arc<dyn TextEmbedder>,
}

impl LanceBackend {
    /// Open the document store at `path`
    pub async fn connect(path: &Path, embedder: Arc<dyn TextEmbedder>) -> Result<Self> {
        let store = DocumentStore::open(path).await?;
        Ok(Self { store, embedder })
    }
}

#[async_trait]
impl IndexBackend for LanceBackend {
    async fn add(&self, user_id: &str, content: &str, chunk_index: i32) -> Result<Option<String>> {
        let embedding = self.embedder.embed(content)?;
        let doc = SemanticDocument::new(user_id, content, embedding, chunk_index);
        let id = doc.id.clone();
        self.store.insert(&[doc]).await?;
        Ok(Some(id))
    }

    async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed(query)?;
        let docs = self.store.search(&query_embedding, user_id, limit).await?;

        Ok(docs
            .into_iter()
            .map(|doc| {
                let similarity = cosine_similarity(&query_embedding, &doc.embedding);
                let distance = 1.0 - similarity;
                SearchHit {
                    content: doc.content,
                    score: 1.0 - distance / 2.0,
                    timestamp: doc.timestamp,
                    chunk_index: doc.chunk_index,
                }
            })
            .collect())
    }

    async fn delete_user(&self, user_id: &str) -> Result<usize> {
        self.store.delete_user(user_id).await
    }

    async fn count(&self, user_id: Option<&str>) -> Result<usize> {
        self.store.count(user_id).await
    }
}

/// Degradable semantic index over conversation chunks
pub struct SemanticIndex {
    backend: Arc<dyn IndexBackend>,
    enabled: bool,
}

impl SemanticIndex {
    /// Build the index with the default embedding model.
    ///
    /// Never fails: an unavailable embedding model or vector store yields a
    /// permanently disabled index.
    pub async fn connect(config: &SemanticConfig) -> Self {
        if !config.enabled {
            info!("semantic index disabled by configuration");
            return Self::disabled();
        }

        let embedder: Arc<dyn TextEmbedder> = match FastEmbedder::new() {
            Ok(embedder) => Arc::new(embedder),
            Err(e) => {
                warn!(error = %e, "embedding model unavailable, semantic index disabled");
                return Self::disabled();
            }
        };

        Self::with_embedder(config, embedder).await
    }

    /// Build the index with an injected embedder
    pub async fn with_embedder(config: &SemanticConfig, embedder: Arc<dyn TextEmbedder>) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            warn!(error = %e, "cannot create index directory, semantic index disabled");
            return Self::disabled();
        }

        match LanceBackend::connect(&config.data_dir, embedder).await {
            Ok(backend) => Self {
                backend: Arc::new(backend),
                enabled: true,
            },
            Err(e) => {
                warn!(error = %e, "vector store unavailable, semantic index disabled");
                Self::disabled()
            }
        }
    }

    /// A permanently disabled index backed by the null object
    pub fn disabled() -> Self {
        Self {
            backend: Arc::new(DisabledBackend),
            enabled: false,
        }
    }

    /// Build an enabled index over an explicit backend
    pub fn with_backend(backend: Arc<dyn IndexBackend>) -> Self {
        Self {
            backend,
            enabled: true,
        }
    }

    /// Whether the backing store is usable
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Index a single snippet; blank content is skipped
    pub async fn add(&self, user_id: &str, content: &str) -> Result<Option<String>> {
        if !self.enabled || content.trim().is_empty() {
            return Ok(None);
        }
        self.backend.add(user_id, content, 0).await
    }

    /// Index a message window as overlapping chunks.
    ///
    /// Windows of `chunk_size` messages step by `chunk_size - 1`, so
    /// consecutive chunks share exactly one boundary message. A trailing
    /// window that would contain only that shared boundary message is
    /// skipped; its content is already covered by the previous chunk.
    pub async fn add_conversation(
        &self,
        user_id: &str,
        messages: &[ChatMessage],
        chunk_size: usize,
    ) -> Result<Vec<String>> {
        if !self.enabled || messages.is_empty() || chunk_size == 0 {
            return Ok(Vec::new());
        }

        let step = chunk_size.saturating_sub(1).max(1);
        let mut ids = Vec::new();
        let mut start = 0;

        while start < messages.len() {
            let end = (start + chunk_size).min(messages.len());
            let chunk = &messages[start..end];
            // With overlapping windows, a trailing chunk of one message is
            // exactly the boundary message of the previous chunk
            if start > 0 && chunk_size > 1 && chunk.len() <= 1 {
                break;
            }

            let content = render_transcript(chunk);
            if let Some(id) = self.backend.add(user_id, &content, start as i32).await? {
                ids.push(id);
            }
            start += step;
        }

        Ok(ids)
    }

    /// Retrieve up to `top_k` chunks for a query, dropping hits below `min_score`
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchHit>> {
        if !self.enabled || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.backend.search(user_id, query, top_k).await?;
        hits.retain(|hit| hit.score >= min_score);
        Ok(hits)
    }

    /// Retrieval results rendered as a labeled block for prompt inclusion
    pub async fn search_formatted(
        &self,
        user_id: &str,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<String> {
        let hits = self.search(user_id, query, top_k, min_score).await?;
        if hits.is_empty() {
            return Ok(String::new());
        }

        let mut blocks = vec!["[Relevant past memories]".to_string()];
        for (i, hit) in hits.iter().enumerate() {
            blocks.push(format!("Memory {}:\n{}", i + 1, hit.content));
        }
        Ok(blocks.join("\n\n"))
    }

    /// Remove every document for a user, returning the count removed
    pub async fn delete_user(&self, user_id: &str) -> Result<usize> {
        self.backend.delete_user(user_id).await
    }

    /// Total documents, optionally filtered to one user
    pub async fn count(&self, user_id: Option<&str>) -> Result<usize> {
        self.backend.count(user_id).await
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

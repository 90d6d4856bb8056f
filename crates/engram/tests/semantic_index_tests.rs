//! Integration tests for the semantic index over a real vector store
//!
//! Uses the deterministic hash embedder so no model download is needed:
//! identical texts embed identically and unrelated texts are uncorrelated.

use std::sync::Arc;

use engram::config::SemanticConfig;
use engram::embedding::TextEmbedder;
use engram::memory::types::{ChatMessage, Role};
use engram::memory::SemanticIndex;
use engram::testing::HashEmbedder;
use tempfile::TempDir;

async fn open_index(dir: &TempDir) -> SemanticIndex {
    let config = SemanticConfig {
        enabled: true,
        data_dir: dir.path().join("index"),
        ..SemanticConfig::default()
    };
    let index = SemanticIndex::with_embedder(&config, Arc::new(HashEmbedder::new())).await;
    assert!(index.enabled(), "index should come up enabled");
    index
}

fn exchange(n: usize) -> Vec<ChatMessage> {
    (0..n)
        .map(|i| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            ChatMessage::new(role, format!("message number {i}"))
        })
        .collect()
}

#[tokio::test]
async fn test_add_and_count() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    let id = index.add("u1", "the user likes sailing").await.unwrap();
    assert!(id.is_some());
    assert_eq!(index.count(Some("u1")).await.unwrap(), 1);
    assert_eq!(index.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_identical_content_scores_near_one() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    index.add("u1", "the user likes sailing").await.unwrap();
    index.add("u1", "completely unrelated topic").await.unwrap();

    let hits = index
        .search("u1", "the user likes sailing", 5, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);

    let exact = hits
        .iter()
        .find(|h| h.content == "the user likes sailing")
        .expect("exact-match hit");
    assert!(exact.score > 0.99, "exact match score was {}", exact.score);

    // min_score filters out the uncorrelated hit
    let hits = index
        .search("u1", "the user likes sailing", 5, 0.9)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "the user likes sailing");
}

#[tokio::test]
async fn test_search_scoped_to_user() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    index.add("alice", "alice talked about cats").await.unwrap();
    index.add("bob", "bob talked about dogs").await.unwrap();

    let hits = index
        .search("alice", "alice talked about cats", 5, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "alice talked about cats");
}

#[tokio::test]
async fn test_add_conversation_chunk_count() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    // Windows of 3 stepping by 2 over 5 messages: chunks at 0 and 2; the
    // trailing single-message window is already covered and skipped
    let ids = index
        .add_conversation("u1", &exchange(5), 3)
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(index.count(Some("u1")).await.unwrap(), 2);
}

#[tokio::test]
async fn test_repeated_content_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    // Repeated mention over time is intentional, not deduplicated
    index.add("u1", "the user likes sailing").await.unwrap();
    index.add("u1", "the user likes sailing").await.unwrap();

    assert_eq!(index.count(Some("u1")).await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_user_removes_only_that_user() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    index.add_conversation("u1", &exchange(4), 2).await.unwrap();
    index.add("u2", "other user content").await.unwrap();

    let removed = index.delete_user("u1").await.unwrap();
    assert!(removed > 0);
    assert_eq!(index.count(Some("u1")).await.unwrap(), 0);
    assert_eq!(index.count(Some("u2")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_search_formatted_block() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;

    index.add("u1", "the user plays the cello").await.unwrap();

    let block = index
        .search_formatted("u1", "the user plays the cello", 3, 0.0)
        .await
        .unwrap();
    assert!(block.starts_with("[Relevant past memories]"));
    assert!(block.contains("Memory 1:\nthe user plays the cello"));

    let empty = index
        .search_formatted("nobody", "anything at all", 3, 0.0)
        .await
        .unwrap();
    assert_eq!(empty, "");
}

#[tokio::test]
async fn test_documents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let index = open_index(&dir).await;
        index.add("u1", "persisted memory").await.unwrap();
    }

    let index = open_index(&dir).await;
    assert_eq!(index.count(Some("u1")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unusable_data_dir_degrades_to_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let config = SemanticConfig {
        enabled: true,
        data_dir: blocker,
        ..SemanticConfig::default()
    };
    let index = SemanticIndex::with_embedder(&config, Arc::new(HashEmbedder::new())).await;

    assert!(!index.enabled());
    assert!(index.add("u1", "content").await.unwrap().is_none());
    assert!(index.search("u1", "content", 3, 0.0).await.unwrap().is_empty());
    assert_eq!(index.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_hash_embedder_contract() {
    // The index assumes a fixed embedding dimension from its embedder
    let embedder = HashEmbedder::new();
    let embedding = embedder.embed("check").unwrap();
    assert_eq!(embedding.len(), engram::embedding::EMBEDDING_DIMENSION);
}

//! Test utilities - deterministic embedder and scripted generation mocks
//!
//! These stand in for the real embedding model and the remote generation
//! backend so the test suite runs without model downloads or network access.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedding::{EMBEDDING_DIMENSION, TextEmbedder};
use crate::error::Result;
use crate::summarizer::provider::{GeneratorError, TextGenerator};

/// Deterministic embedder producing 384-dimensional vectors from a text hash.
///
/// Identical texts embed identically; different texts are effectively
/// uncorrelated, which is enough to exercise indexing and retrieval.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl TextEmbedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        Ok((0..EMBEDDING_DIMENSION)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect())
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Generator returning scripted responses in order.
///
/// Once the script is exhausted every further call returns the fallback
/// (`"none"` by default). Prompts and call counts are recorded for
/// assertions.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    fallback: String,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            fallback: "none".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replace the response used once the script runs out
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Number of generation calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Generator that fails every call
#[derive(Debug, Default)]
pub struct FailingGenerator {
    calls: AtomicUsize,
}

impl FailingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of generation calls attempted so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> std::result::Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeneratorError::Api("backend unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        assert_eq!(
            embedder.embed("hello world").unwrap(),
            embedder.embed("hello world").unwrap()
        );
    }

    #[test]
    fn hash_embedder_has_correct_dimensions() {
        let embedder = HashEmbedder::new();
        assert_eq!(embedder.embed("test").unwrap().len(), EMBEDDING_DIMENSION);
    }

    #[test]
    fn hash_embedder_values_in_range() {
        let embedder = HashEmbedder::new();
        for value in embedder.embed("test input").unwrap() {
            assert!((-1.0..=1.0).contains(&value), "Value {value} out of range");
        }
    }

    #[test]
    fn hash_embedder_differs_for_different_inputs() {
        let embedder = HashEmbedder::new();
        assert_ne!(
            embedder.embed("hello").unwrap(),
            embedder.embed("world").unwrap()
        );
    }

    #[tokio::test]
    async fn scripted_generator_pops_then_falls_back() {
        let generator = ScriptedGenerator::new(["first", "second"]);

        assert_eq!(generator.generate("p1").await.unwrap(), "first");
        assert_eq!(generator.generate("p2").await.unwrap(), "second");
        assert_eq!(generator.generate("p3").await.unwrap(), "none");
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn failing_generator_always_errors() {
        let generator = FailingGenerator::new();
        assert!(generator.generate("anything").await.is_err());
        assert_eq!(generator.call_count(), 1);
    }
}

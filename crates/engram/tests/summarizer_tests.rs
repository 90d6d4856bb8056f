//! Integration tests for summarization over an OpenAI-compatible endpoint
//!
//! Drives the Summarizer end-to-end through the HTTP generator against a
//! wiremock server.

use std::env;
use std::sync::Arc;

use engram::config::GeneratorConfig;
use engram::memory::types::{ChatMessage, Role};
use engram::summarizer::{OpenAiGenerator, Summarizer};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn window() -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(Role::User, "I started learning the cello"),
        ChatMessage::new(Role::Assistant, "How is it going?"),
        ChatMessage::new(Role::User, "Slowly, my fingers hurt"),
        ChatMessage::new(Role::Assistant, "That passes with practice"),
    ]
}

fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": { "content": content }
        }]
    })
}

fn generator_config(api_url: String, api_key_env: &str) -> GeneratorConfig {
    GeneratorConfig {
        api_url,
        api_key_env: api_key_env.to_string(),
        model: "gpt-4o-mini".to_string(),
        timeout_secs: 30,
    }
}

#[tokio::test]
async fn test_summarize_and_extract_full_flow() {
    let mock_server = MockServer::start().await;

    // First call: summary update
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("The user is learning the cello.")),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    // Second call: fact extraction
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("- learning the cello\n- practices daily")),
        )
        .mount(&mock_server)
        .await;

    unsafe { env::set_var("ENGRAM_TEST_KEY_FLOW", "test-key") };
    let config = generator_config(mock_server.uri(), "ENGRAM_TEST_KEY_FLOW");
    let summarizer = Summarizer::new(Arc::new(OpenAiGenerator::new(&config).unwrap()));

    let summary = summarizer.summarize(&window(), "").await;
    assert_eq!(summary, "The user is learning the cello.");

    let facts = summarizer.extract_facts(&window()).await;
    assert_eq!(facts, vec!["learning the cello", "practices daily"]);
}

#[tokio::test]
async fn test_prompt_carries_transcript_and_existing_summary() {
    let mock_server = MockServer::start().await;

    // The request body must carry the rendered transcript and the framing
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("User: I started learning the cello"))
        .and(body_string_contains("[Previous summary: The user plays piano.]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("updated")))
        .expect(1)
        .mount(&mock_server)
        .await;

    unsafe { env::set_var("ENGRAM_TEST_KEY_PROMPT", "test-key") };
    let config = generator_config(mock_server.uri(), "ENGRAM_TEST_KEY_PROMPT");
    let summarizer = Summarizer::new(Arc::new(OpenAiGenerator::new(&config).unwrap()));

    let summary = summarizer.summarize(&window(), "The user plays piano.").await;
    assert_eq!(summary, "updated");
}

#[tokio::test]
async fn test_backend_failure_degrades_gracefully() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    unsafe { env::set_var("ENGRAM_TEST_KEY_FAIL", "test-key") };
    let config = generator_config(mock_server.uri(), "ENGRAM_TEST_KEY_FAIL");
    let summarizer = Summarizer::new(Arc::new(OpenAiGenerator::new(&config).unwrap()));

    let summary = summarizer.summarize(&window(), "kept summary").await;
    assert_eq!(summary, "kept summary");

    let facts = summarizer.extract_facts(&window()).await;
    assert!(facts.is_empty());
}

#[tokio::test]
async fn test_none_sentinel_yields_no_facts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("none")))
        .mount(&mock_server)
        .await;

    unsafe { env::set_var("ENGRAM_TEST_KEY_NONE", "test-key") };
    let config = generator_config(mock_server.uri(), "ENGRAM_TEST_KEY_NONE");
    let summarizer = Summarizer::new(Arc::new(OpenAiGenerator::new(&config).unwrap()));

    let facts = summarizer.extract_facts(&window()).await;
    assert!(facts.is_empty());
}

//! Mock HTTP server tests for `OpenAiCompatProvider::complete()`.
//!
//! Uses [`wiremock`] to stand up a local server emulating OpenAI-compatible
//! chat completion responses, exercising the full request/response path
//! without a real API.
//!
//! Coverage:
//! - Successful completion with usage accounting
//! - 401 authentication failure
//! - 429 rate limiting (retry_after_ms extraction)
//! - 404 / 422 terminal rejections
//! - 500 server error classified transient
//! - Malformed JSON response
//! - Missing usage block

use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prospector_llm::openai_compat::{LlmEndpoint, OpenAiCompatProvider};
use prospector_llm::{ChatMessage, ChatRequest, Provider, RemoteError};

fn mock_endpoint(server_url: &str) -> LlmEndpoint {
    LlmEndpoint {
        base_url: server_url.into(),
        api_key_env: "MOCK_UNUSED_KEY".into(),
        timeout: Duration::from_secs(5),
    }
}

fn test_request() -> ChatRequest {
    ChatRequest::new("test-model", vec![ChatMessage::user("Hello")]).json_mode()
}

fn success_body() -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test-001",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "{\"discard\": false}"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 42, "completion_tokens": 17, "total_tokens": 59}
    })
}

#[tokio::test]
async fn complete_success_with_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "sk-mock-key".into());
    let response = provider.complete(&test_request()).await.unwrap();

    assert_eq!(response.id, "chatcmpl-test-001");
    assert_eq!(response.text(), "{\"discard\": false}");
    let usage = response.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 42);
    assert_eq!(usage.completion_tokens, 17);
}

#[tokio::test]
async fn complete_missing_usage_is_none() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": "plain text"}}]
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "k".into());
    let response = provider.complete(&test_request()).await.unwrap();
    assert!(response.usage.is_none());
    assert_eq!(response.text(), "plain text");
}

#[tokio::test]
async fn complete_401_is_auth_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "bad".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(matches!(err, RemoteError::AuthFailed(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn complete_429_extracts_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_string(r#"{"retry_after_ms": 3000}"#),
        )
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "k".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    match err {
        RemoteError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 3000),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn complete_404_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "k".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn complete_422_is_unprocessable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad temperature"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "k".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Unprocessable(_)));
}

#[tokio::test]
async fn complete_500_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "k".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(err.is_transient(), "500 must classify transient: {err:?}");
}

#[tokio::test]
async fn complete_malformed_json_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let provider = OpenAiCompatProvider::with_api_key(mock_endpoint(&server.uri()), "k".into());
    let err = provider.complete(&test_request()).await.unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
    assert!(!err.is_transient());
}

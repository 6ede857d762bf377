//! Integration tests for the Anthropic Messages API client

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use cohort_engine::llm::{
    AnthropicProvider, ContentBlock, LLMError, LLMProvider, ModelRequest, StopReason,
};
use cohort_engine::secrets::SecretString;
use sdk::ToolSpec;

fn provider(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(server.uri(), SecretString::new("test-key-123"), 5).unwrap()
}

#[tokio::test]
async fn test_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key-123"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"model": "claude-test", "max_tokens": 64})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello there"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = ModelRequest::single_turn("claude-test", "Be brief.", "Hi", 64);
    let response = provider(&server).complete(&request).await.unwrap();

    assert_eq!(response.text(), "Hello there");
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert_eq!(response.usage.total(), 15);
    assert!(!response.wants_tools());
}

#[tokio::test]
async fn test_tool_use_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({"tools": [{"name": "file_read"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Reading the file."},
                {"type": "thinking", "thinking": "hmm"},
                {"type": "tool_use", "id": "toolu_1", "name": "file_read", "input": {"path": "a.txt"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 8}
        })))
        .mount(&server)
        .await;

    let mut request = ModelRequest::single_turn("claude-test", "", "Read a.txt", 64);
    request.tools = vec![ToolSpec::new("file_read", "Read a file")];
    let response = provider(&server).complete(&request).await.unwrap();

    assert!(response.wants_tools());
    // Unknown block types are dropped
    assert_eq!(response.content.len(), 2);
    let uses: Vec<_> = response.tool_uses().collect();
    assert_eq!(uses.len(), 1);
    assert_eq!(uses[0].0, "toolu_1");
    assert_eq!(uses[0].1, "file_read");
    assert_eq!(uses[0].2["path"], "a.txt");
    assert!(matches!(response.content[0], ContentBlock::Text { .. }));
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let request = ModelRequest::single_turn("claude-test", "", "Hi", 16);
    let err = provider(&server).complete(&request).await.unwrap_err();
    assert!(matches!(err, LLMError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_rate_limit_maps_to_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let request = ModelRequest::single_turn("claude-test", "", "Hi", 16);
    let err = provider(&server).complete(&request).await.unwrap_err();
    assert!(matches!(err, LLMError::RateLimitExceeded));
}

#[tokio::test]
async fn test_server_error_is_invalid_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let request = ModelRequest::single_turn("claude-test", "", "Hi", 16);
    let err = provider(&server).complete(&request).await.unwrap_err();
    match err {
        LLMError::InvalidRequest(msg) => assert!(msg.contains("overloaded")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let request = ModelRequest::single_turn("claude-test", "", "Hi", 16);
    let err = provider(&server).complete(&request).await.unwrap_err();
    assert!(matches!(err, LLMError::ParseError(_)));
}

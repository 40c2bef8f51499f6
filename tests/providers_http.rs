//! Provider and gateway behavior against mocked HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use polyplex::llm::{
    CompletionGateway, CompletionRequest, CompletionRole, GeminiProvider, GenerationRequest,
    LlmGateway, LlmProvider, Message, OpenAiCompatibleProvider, ProviderRegistry, RetryPolicy,
};
use polyplex::LlmError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
    })
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
    }
}

fn request(model: &str) -> GenerationRequest {
    GenerationRequest::new(
        model,
        vec![
            Message::system("You review code."),
            Message::user("fn main() {}"),
        ],
    )
    .with_temperature(0.1)
    .with_max_tokens(64)
}

#[tokio::test]
async fn test_openai_compatible_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({ "model": "gpt-4o", "max_tokens": 64 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("looks fine")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiCompatibleProvider::new(
        "openai",
        Some("sk-test".to_string()),
        format!("{}/v1", mock_server.uri()),
        "gpt-4o",
    )
    .unwrap();

    let response = provider.generate(request("")).await.unwrap();
    assert_eq!(response.first_content(), Some("looks fine"));
    assert_eq!(response.choices[0].finish_reason, "stop");
}

#[tokio::test]
async fn test_lmstudio_uses_v1_without_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("local answer")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiCompatibleProvider::lmstudio(&mock_server.uri()).unwrap();
    assert_eq!(provider.api_key_masked(), "");

    let response = provider.generate(request("qwen2.5-coder")).await.unwrap();
    assert_eq!(response.first_content(), Some("local answer"));

    let received = mock_server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": { "message": "overloaded" }
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("second try")))
        .mount(&mock_server)
        .await;

    let provider = OpenAiCompatibleProvider::lmstudio(&mock_server.uri())
        .unwrap()
        .with_retry_policy(fast_retry());

    let response = provider.generate(request("")).await.unwrap();
    assert_eq!(response.first_content(), Some("second try"));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "invalid api key" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiCompatibleProvider::new(
        "openai",
        Some("sk-wrong".to_string()),
        format!("{}/v1", mock_server.uri()),
        "gpt-4o",
    )
    .unwrap()
    .with_retry_policy(fast_retry());

    let err = provider.generate(request("")).await.unwrap_err();
    match err {
        LlmError::ApiError { code, message } => {
            assert_eq!(code, 401);
            assert_eq!(message, "invalid api key");
        }
        other => panic!("expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gemini_maps_system_instruction() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(serde_json::json!({
            "systemInstruction": { "parts": [{ "text": "You review code." }] },
            "contents": [{ "role": "user", "parts": [{ "text": "fn main() {}" }] }],
            "generationConfig": { "maxOutputTokens": 64 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "score " }, { "text": "90" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 8, "candidatesTokenCount": 2, "totalTokenCount": 10 }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = GeminiProvider::with_custom_url("g-key".to_string(), mock_server.uri()).unwrap();
    let response = provider.generate(request("gemini-test")).await.unwrap();

    assert_eq!(response.first_content(), Some("score 90"));
    assert_eq!(response.choices[0].finish_reason, "stop");
}

#[tokio::test]
async fn test_gateway_routes_by_provider_name() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("  trimmed  ")))
        .mount(&mock_server)
        .await;

    let mut registry = ProviderRegistry::new("lmstudio");
    registry.register(
        "lmstudio",
        Arc::new(OpenAiCompatibleProvider::lmstudio(&mock_server.uri()).unwrap()),
    );
    let gateway = LlmGateway::new(Arc::new(registry));

    let completion = CompletionRequest {
        role: CompletionRole::Critique,
        provider: String::new(),
        model: String::new(),
        system: "You review code.".to_string(),
        user: "fn main() {}".to_string(),
        temperature: 0.1,
        max_tokens: None,
    };

    let text = gateway.complete(completion.clone()).await.unwrap();
    assert_eq!(text, "trimmed");

    let unknown = CompletionRequest {
        provider: "gemini".to_string(),
        ..completion
    };
    assert!(matches!(
        gateway.complete(unknown).await,
        Err(LlmError::MissingApiKey(_))
    ));
}

#[tokio::test]
async fn test_gateway_rejects_empty_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("   ")))
        .mount(&mock_server)
        .await;

    let mut registry = ProviderRegistry::new("lmstudio");
    registry.register(
        "lmstudio",
        Arc::new(OpenAiCompatibleProvider::lmstudio(&mock_server.uri()).unwrap()),
    );
    let gateway = LlmGateway::new(Arc::new(registry));

    let result = gateway
        .complete(CompletionRequest {
            role: CompletionRole::Implement,
            provider: "lmstudio".to_string(),
            model: String::new(),
            system: String::new(),
            user: "write it".to_string(),
            temperature: 0.3,
            max_tokens: Some(128),
        })
        .await;
    assert!(matches!(result, Err(LlmError::EmptyResponse)));
}

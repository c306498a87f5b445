//! HTTP invoker tests against a wiremock provider.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recovery_orchestrator::config::ProviderConfig;
use recovery_orchestrator::error::InvokerError;
use recovery_orchestrator::invoker::{
    HttpModelInvoker, InvokeOptions, ModelInvoker, ModelMessage,
};
use recovery_orchestrator::types::Provider;

fn config_for(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        anthropic_api_key: "anthropic-test-key".to_string(),
        anthropic_base_url: server.uri(),
        openrouter_api_key: "openrouter-test-key".to_string(),
        openrouter_base_url: server.uri(),
        timeout_ms: 5_000,
        max_retries: 2,
        retry_delay_ms: 1,
    }
}

fn messages() -> Vec<ModelMessage> {
    vec![
        ModelMessage::system("You are a disaster-recovery analyst."),
        ModelMessage::user("Assess flood damage at 123 Smith St"),
    ]
}

#[tokio::test]
async fn anthropic_response_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "anthropic-test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "The kitchen floor is saturated.\n"},
                {"type": "text", "text": "CONFIDENCE: 0.9"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let invoker = HttpModelInvoker::new(&config_for(&server)).unwrap();
    let response = invoker
        .generate(
            messages(),
            InvokeOptions::default().with_provider(Provider::AnthropicClaude),
        )
        .await
        .unwrap();

    assert_eq!(response.provider, Provider::AnthropicClaude);
    assert!(response.content.contains("saturated"));
    assert!(response.content.contains("CONFIDENCE: 0.9"));
    assert_eq!(response.tokens_used, 20);
}

#[tokio::test]
async fn openrouter_response_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer openrouter-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [
                {"message": {"role": "assistant", "content": "Dry the subfloor first."}}
            ],
            "usage": {"total_tokens": 33}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let invoker = HttpModelInvoker::new(&config_for(&server)).unwrap();
    let response = invoker
        .generate(
            messages(),
            InvokeOptions::default().with_provider(Provider::OpenRouterGptOss120b),
        )
        .await
        .unwrap();

    assert_eq!(response.provider, Provider::OpenRouterGptOss120b);
    assert_eq!(response.content, "Dry the subfloor first.");
    assert_eq!(response.tokens_used, 33);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Recovered answer."}],
            "usage": {"input_tokens": 5, "output_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let invoker = HttpModelInvoker::new(&config_for(&server)).unwrap();
    let response = invoker
        .generate(
            messages(),
            InvokeOptions::default().with_provider(Provider::AnthropicClaude),
        )
        .await
        .unwrap();

    assert_eq!(response.content, "Recovered answer.");
}

#[tokio::test]
async fn bad_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let invoker = HttpModelInvoker::new(&config_for(&server)).unwrap();
    let result = invoker
        .generate(
            messages(),
            InvokeOptions::default().with_provider(Provider::AnthropicClaude),
        )
        .await;

    assert!(matches!(result, Err(InvokerError::InvalidRequest { .. })));
}

#[tokio::test]
async fn exhausted_retries_report_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(2)
        .mount(&server)
        .await;

    let invoker = HttpModelInvoker::new(&config_for(&server)).unwrap();
    let result = invoker
        .generate(
            messages(),
            InvokeOptions::default()
                .with_provider(Provider::AnthropicClaude)
                .with_max_retries(1),
        )
        .await;

    match result {
        Err(InvokerError::Unavailable { retries, .. }) => assert_eq!(retries, 2),
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

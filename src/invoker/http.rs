use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::types::{InvokeOptions, MessageRole, ModelMessage, ModelResponse};
use super::ModelInvoker;
use crate::config::ProviderConfig;
use crate::error::{InvokerError, InvokerResult};
use crate::types::Provider;

const ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const OPENROUTER_MODEL: &str = "openai/gpt-oss-120b";
const MAX_COMPLETION_TOKENS: u32 = 4_000;

/// HTTP-backed model invoker covering both supported providers.
///
/// Anthropic speaks its native messages API; OpenRouter speaks the
/// OpenAI-compatible chat completions API. Failed calls retry with
/// exponential backoff, but only when the error class can succeed on retry.
#[derive(Clone)]
pub struct HttpModelInvoker {
    client: Client,
    config: ProviderConfig,
}

impl HttpModelInvoker {
    /// Create a new invoker from provider configuration.
    pub fn new(config: &ProviderConfig) -> InvokerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(InvokerError::Http)?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn execute(
        &self,
        provider: Provider,
        messages: &[ModelMessage],
        timeout_ms: u64,
    ) -> InvokerResult<ModelResponse> {
        debug!(
            provider = %provider,
            messages = messages.len(),
            "Calling model provider"
        );

        let start = Instant::now();
        let response = match provider {
            Provider::AnthropicClaude => self.call_anthropic(messages, timeout_ms).await?,
            Provider::OpenRouterGptOss120b => self.call_openrouter(messages, timeout_ms).await?,
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        Ok(ModelResponse {
            latency_ms,
            ..response
        })
    }

    async fn call_anthropic(
        &self,
        messages: &[ModelMessage],
        timeout_ms: u64,
    ) -> InvokerResult<ModelResponse> {
        let url = format!(
            "{}/v1/messages",
            self.config.anthropic_base_url.trim_end_matches('/')
        );

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let chat: Vec<AnthropicMessage<'_>> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                },
                content: &m.content,
            })
            .collect();

        let body = AnthropicRequest {
            model: ANTHROPIC_MODEL,
            max_tokens: MAX_COMPLETION_TOKENS,
            system: system.join("\n\n"),
            messages: chat,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.anthropic_api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(Duration::from_millis(timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), error_body));
        }

        let parsed: AnthropicResponse =
            response
                .json()
                .await
                .map_err(|e| InvokerError::InvalidResponse {
                    message: format!("Failed to parse Anthropic response: {}", e),
                })?;

        let content = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(InvokerError::InvalidResponse {
                message: "Anthropic response contained no text blocks".to_string(),
            });
        }

        Ok(ModelResponse {
            content,
            confidence: None,
            provider: Provider::AnthropicClaude,
            tokens_used: parsed.usage.input_tokens + parsed.usage.output_tokens,
            latency_ms: 0,
        })
    }

    async fn call_openrouter(
        &self,
        messages: &[ModelMessage],
        timeout_ms: u64,
    ) -> InvokerResult<ModelResponse> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.openrouter_base_url.trim_end_matches('/')
        );

        let chat: Vec<OpenAiMessage<'_>> = messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect();

        let body = OpenAiRequest {
            model: OPENROUTER_MODEL,
            messages: chat,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.openrouter_api_key),
            )
            .timeout(Duration::from_millis(timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), error_body));
        }

        let parsed: OpenAiResponse =
            response
                .json()
                .await
                .map_err(|e| InvokerError::InvalidResponse {
                    message: format!("Failed to parse OpenRouter response: {}", e),
                })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InvokerError::InvalidResponse {
                message: "OpenRouter response contained no choices".to_string(),
            })?;

        Ok(ModelResponse {
            content,
            confidence: None,
            provider: Provider::OpenRouterGptOss120b,
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
            latency_ms: 0,
        })
    }

    fn classify_transport_error(&self, e: reqwest::Error, timeout_ms: u64) -> InvokerError {
        if e.is_timeout() {
            InvokerError::Timeout { timeout_ms }
        } else {
            InvokerError::Http(e)
        }
    }
}

#[async_trait]
impl ModelInvoker for HttpModelInvoker {
    async fn generate(
        &self,
        messages: Vec<ModelMessage>,
        options: InvokeOptions,
    ) -> InvokerResult<ModelResponse> {
        if messages.is_empty() {
            return Err(InvokerError::InvalidRequest {
                message: "messages cannot be empty".to_string(),
            });
        }

        let provider = options.preferred_provider.unwrap_or(Provider::fastest());
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.timeout_ms);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= max_retries {
            if retries > 0 {
                let delay =
                    Duration::from_millis(self.config.retry_delay_ms * (2_u64.pow(retries - 1)));
                warn!(
                    provider = %provider,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying model request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match self.execute(provider, &messages, timeout_ms).await {
                Ok(response) => {
                    info!(
                        provider = %provider,
                        latency_ms = response.latency_ms,
                        tokens = response.tokens_used,
                        "Model call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() => {
                    error!(provider = %provider, error = %e, "Model call failed (not retryable)");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        provider = %provider,
                        error = %e,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retry = retries,
                        "Model call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(InvokerError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }
}

fn classify_status(status: u16, message: String) -> InvokerError {
    if status == 400 || status == 422 {
        InvokerError::InvalidRequest { message }
    } else {
        InvokerError::Api { status, message }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    total_tokens: u64,
}

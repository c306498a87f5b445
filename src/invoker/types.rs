use serde::{Deserialize, Serialize};

use crate::types::Provider;

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single message in a model conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ModelMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call invocation options
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Provider to use; `None` lets the invoker pick its default
    pub preferred_provider: Option<Provider>,
    /// Override for the configured retry count
    pub max_retries: Option<u32>,
    /// Override for the configured request timeout
    pub timeout_ms: Option<u64>,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            preferred_provider: None,
            max_retries: None,
            timeout_ms: None,
        }
    }
}

impl InvokeOptions {
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.preferred_provider = Some(provider);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// A completed model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Completion text
    pub content: String,
    /// Confidence reported by the provider, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Provider that served the call
    pub provider: Provider,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = ModelMessage::system("be helpful");
        assert_eq!(msg.role, MessageRole::System);
        assert_eq!(msg.content, "be helpful");

        let msg = ModelMessage::user("analyze this");
        assert_eq!(msg.role, MessageRole::User);

        let msg = ModelMessage::assistant("done");
        assert_eq!(msg.role, MessageRole::Assistant);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_options_builder() {
        let opts = InvokeOptions::default()
            .with_provider(Provider::AnthropicClaude)
            .with_max_retries(2)
            .with_timeout_ms(5_000);
        assert_eq!(opts.preferred_provider, Some(Provider::AnthropicClaude));
        assert_eq!(opts.max_retries, Some(2));
        assert_eq!(opts.timeout_ms, Some(5_000));
    }
}

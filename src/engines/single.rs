use serde::{Deserialize, Serialize};
use tracing::info;

use super::EngineCore;
use crate::error::OrchResult;
use crate::invoker::{InvokeOptions, ModelMessage};
use crate::parser::extract_confidence;
use crate::prompts::{single_agent_prompt, EMERGENCY_SYSTEM_PROMPT, SINGLE_AGENT_SYSTEM_PROMPT};
use crate::types::{Provider, TaskRequest};

const DEFAULT_CONFIDENCE: f64 = 0.7;
const EMERGENCY_TIMEOUT_MS: u64 = 10_000;

/// Parameters for single-agent analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleParams {
    /// Provider to use; `None` picks the invoker default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// Emergency mode: fastest provider, terse prompt, short deadline
    #[serde(default)]
    pub emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl SingleParams {
    pub fn new() -> Self {
        Self {
            provider: None,
            emergency: false,
            timeout_ms: None,
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn emergency() -> Self {
        Self {
            provider: Some(Provider::fastest()),
            emergency: true,
            timeout_ms: Some(EMERGENCY_TIMEOUT_MS),
        }
    }
}

impl Default for SingleParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of single-agent analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleOutcome {
    pub result: String,
    pub confidence: f64,
    pub provider: Provider,
    pub tokens_used: u64,
}

/// One-shot analysis engine
pub struct SingleEngine {
    core: EngineCore,
}

impl SingleEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    /// Run one analysis call for the task.
    pub async fn run(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        params: SingleParams,
    ) -> OrchResult<SingleOutcome> {
        let system = if params.emergency {
            EMERGENCY_SYSTEM_PROMPT
        } else {
            SINGLE_AGENT_SYSTEM_PROMPT
        };

        let messages = vec![
            ModelMessage::system(system),
            ModelMessage::user(single_agent_prompt(request, context_summary)),
        ];

        let mut options = InvokeOptions::default();
        if let Some(provider) = params.provider {
            options = options.with_provider(provider);
        }
        if let Some(timeout_ms) = params.timeout_ms {
            options = options.with_timeout_ms(timeout_ms);
        }

        let response = match params.timeout_ms {
            Some(deadline) => {
                self.core
                    .invoke_with_deadline(messages, options, deadline)
                    .await?
            }
            None => self.core.invoke(messages, options).await?,
        };

        let confidence = extract_confidence(&response.content)
            .or(response.confidence)
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);

        info!(
            task_id = %request.id,
            provider = %response.provider,
            confidence,
            emergency = params.emergency,
            "Single-agent analysis completed"
        );

        Ok(SingleOutcome {
            result: response.content,
            confidence,
            provider: response.provider,
            tokens_used: response.tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{MockModelInvoker, ModelResponse};
    use crate::types::{TaskType, Provider};
    use std::sync::Arc;

    fn engine_with_response(content: &str, confidence: Option<f64>) -> SingleEngine {
        let content = content.to_string();
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(move |_, _| {
            Ok(ModelResponse {
                content: content.clone(),
                confidence,
                provider: Provider::AnthropicClaude,
                tokens_used: 100,
                latency_ms: 50,
            })
        });
        SingleEngine::new(EngineCore::new(Arc::new(mock), crate::events::EventBus::new()))
    }

    #[tokio::test]
    async fn test_confidence_from_trailer() {
        let engine = engine_with_response("Roof is stable.\nCONFIDENCE: 0.85", None);
        let request = TaskRequest::new(TaskType::SafetyCheck, "Check the roof");
        let outcome = engine.run(&request, None, SingleParams::new()).await.unwrap();
        assert_eq!(outcome.confidence, 0.85);
        assert!(outcome.result.contains("Roof is stable"));
    }

    #[tokio::test]
    async fn test_confidence_falls_back_to_model_then_default() {
        let engine = engine_with_response("No trailer here", Some(0.6));
        let request = TaskRequest::new(TaskType::General, "Summarize");
        let outcome = engine.run(&request, None, SingleParams::new()).await.unwrap();
        assert_eq!(outcome.confidence, 0.6);

        let engine = engine_with_response("No trailer here", None);
        let outcome = engine.run(&request, None, SingleParams::new()).await.unwrap();
        assert_eq!(outcome.confidence, DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_emergency_params_use_fastest_provider() {
        let params = SingleParams::emergency();
        assert_eq!(params.provider, Some(Provider::fastest()));
        assert!(params.emergency);
        assert_eq!(params.timeout_ms, Some(EMERGENCY_TIMEOUT_MS));
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::error::{OrchResult, OrchestrationError};
use crate::events::EventBus;
use crate::invoker::{InvokeOptions, ModelInvoker, ModelMessage, ModelResponse};

/// Shared dependencies for all strategy engines.
///
/// Cheap to clone; engines hold one each so the service can construct them
/// independently while sharing the same invoker and event bus.
#[derive(Clone)]
pub struct EngineCore {
    invoker: Arc<dyn ModelInvoker>,
    events: EventBus,
}

impl EngineCore {
    pub fn new(invoker: Arc<dyn ModelInvoker>, events: EventBus) -> Self {
        Self { invoker, events }
    }

    /// Bus on which engines publish progress notifications.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run a model call with a hard deadline.
    ///
    /// The deadline covers the whole call including the invoker's internal
    /// retries, so a slow provider cannot blow a step's time budget.
    pub async fn invoke_with_deadline(
        &self,
        messages: Vec<ModelMessage>,
        options: InvokeOptions,
        deadline_ms: u64,
    ) -> OrchResult<ModelResponse> {
        let fut = self.invoker.generate(messages, options);
        match tokio::time::timeout(Duration::from_millis(deadline_ms), fut).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(OrchestrationError::ModelCall(e)),
            Err(_) => Err(OrchestrationError::StepTimeout {
                timeout_ms: deadline_ms,
            }),
        }
    }

    /// Run a model call without an engine-level deadline.
    pub async fn invoke(
        &self,
        messages: Vec<ModelMessage>,
        options: InvokeOptions,
    ) -> OrchResult<ModelResponse> {
        self.invoker
            .generate(messages, options)
            .await
            .map_err(OrchestrationError::ModelCall)
    }
}

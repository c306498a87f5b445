//! Model invocation layer.
//!
//! The [`ModelInvoker`] trait is the single seam between reasoning strategies
//! and model providers. Engines depend on `Arc<dyn ModelInvoker>` so tests can
//! substitute a mock and the fallback manager can steer provider choice
//! without the engines knowing.

mod http;
mod types;

pub use http::HttpModelInvoker;
pub use types::{InvokeOptions, MessageRole, ModelMessage, ModelResponse};

use async_trait::async_trait;

use crate::error::InvokerResult;

/// Abstraction over model providers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Generate a completion for the given conversation.
    ///
    /// Implementations must return an error classified as retryable (provider
    /// unavailable, timeout) or not (invalid request) so callers can decide
    /// whether a retry or fallback is worthwhile.
    async fn generate(
        &self,
        messages: Vec<ModelMessage>,
        options: InvokeOptions,
    ) -> InvokerResult<ModelResponse>;
}

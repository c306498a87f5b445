use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Model invoker error: {0}")]
    Invoker(#[from] InvokerError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Model provider layer errors
#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("Provider unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl InvokerError {
    /// Whether a retry against the same or another provider can succeed.
    ///
    /// Malformed requests never become valid on retry; transport failures,
    /// timeouts, and 5xx responses can.
    pub fn is_retryable(&self) -> bool {
        match self {
            InvokerError::Unavailable { .. } | InvokerError::Timeout { .. } => true,
            InvokerError::Api { status, .. } => *status >= 500 || *status == 429,
            InvokerError::InvalidRequest { .. } | InvokerError::InvalidResponse { .. } => false,
            InvokerError::Http(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

/// Strategy and service layer errors
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("All strategies exhausted for task {task_id}: {message}")]
    AllStrategiesFailed { task_id: String, message: String },

    #[error("Context not found: {context_id}")]
    ContextNotFound { context_id: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Strategy failed: {message}")]
    StrategyFailed { message: String },

    #[error("Model call failed: {0}")]
    ModelCall(#[from] InvokerError),

    #[error("Discussion deadlocked after {rounds} rounds (convergence {convergence:.2})")]
    DiscussionDeadlocked { rounds: u32, convergence: f64 },

    #[error("Step timed out after {timeout_ms}ms")]
    StepTimeout { timeout_ms: u64 },
}

impl OrchestrationError {
    /// Whether retrying the same strategy can succeed.
    ///
    /// Transient model-call failures and step timeouts are worth retrying; a
    /// deadlocked discussion or an internally inconsistent strategy run is
    /// not, and the fallback chain should degrade instead.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestrationError::ModelCall(e) => e.is_retryable(),
            OrchestrationError::StepTimeout { .. } => true,
            OrchestrationError::AllStrategiesFailed { .. }
            | OrchestrationError::ContextNotFound { .. }
            | OrchestrationError::Validation { .. }
            | OrchestrationError::StrategyFailed { .. }
            | OrchestrationError::DiscussionDeadlocked { .. } => false,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for model invoker operations
pub type InvokerResult<T> = Result<T, InvokerError>;

/// Result type alias for strategy-level operations
pub type OrchResult<T> = Result<T, OrchestrationError>;

//! Graceful degradation across strategies and providers.
//!
//! The manager owns the fallback chain for each primary approach, a circuit
//! breaker per operation (approach plus task type), and the terminal
//! emergency templates. Execution walks the chain level by level: each level
//! is retried with backoff up to the configured retry budget while the error
//! stays retryable, a level whose operation circuit is open is skipped, and
//! the terminal template answers when nothing else can. The manager never
//! returns an error from execution.

mod breaker;
mod emergency;

pub use breaker::{CircuitBreaker, CircuitState};
pub use emergency::{emergency_answer, EmergencyAnswer};

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::engines::{
    DiscussionEngine, DiscussionParams, SequentialEngine, SequentialParams, SingleEngine,
    SingleParams,
};
use crate::error::{OrchResult, OrchestrationError};
use crate::events::{EventBus, OrchestrationEvent};
use crate::types::{
    Approach, Provider, TaskPriority, TaskRequest, TaskType, EMERGENCY_FALLBACK_LEVEL,
};

/// Bound on the retained fallback history
const HISTORY_LIMIT: usize = 100;

/// Result of executing a task through the fallback chain. Always a usable
/// answer; `fallback_level` records how degraded it is.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub result: String,
    pub confidence: f64,
    pub approach: Approach,
    pub provider: Option<Provider>,
    pub fallback_level: u32,
    pub tokens_used: u64,
    pub warnings: Vec<String>,
    /// Intermediate findings worth keeping in the conversation context
    pub insights: Vec<String>,
}

/// One recorded fallback transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub task_id: String,
    pub from: Approach,
    pub to: Approach,
    pub level: u32,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Aggregate fallback counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackStats {
    pub total_fallbacks: u64,
    pub emergency_answers: u64,
    pub by_level: HashMap<u32, u64>,
}

/// One level of a fallback chain
#[derive(Debug, Clone)]
enum Attempt {
    Sequential {
        simplified: bool,
        provider: Provider,
    },
    Discussion {
        limited: bool,
        provider: Provider,
    },
    Single {
        provider: Provider,
        emergency: bool,
    },
}

impl Attempt {
    fn approach(&self) -> Approach {
        match self {
            Attempt::Sequential { .. } => Approach::SequentialThinking,
            Attempt::Discussion { .. } => Approach::MultiAgentDiscussion,
            Attempt::Single { .. } => Approach::SingleAgent,
        }
    }

    fn describe(&self) -> String {
        match self {
            Attempt::Sequential { simplified: true, .. } => "simplified sequential".to_string(),
            Attempt::Sequential { .. } => "sequential thinking".to_string(),
            Attempt::Discussion { limited: true, .. } => "limited discussion".to_string(),
            Attempt::Discussion { .. } => "multi-agent discussion".to_string(),
            Attempt::Single {
                emergency: true, ..
            } => "emergency single-agent".to_string(),
            Attempt::Single { provider, .. } => format!("single-agent on {}", provider),
        }
    }
}

/// Breaker key: which strategy is being run for which kind of task.
fn operation_key(approach: Approach, task_type: TaskType) -> String {
    format!("{}_{}", approach, task_type)
}

/// Degradation controller for strategy execution.
pub struct FallbackManager {
    sequential: SequentialEngine,
    discussion: DiscussionEngine,
    single: SingleEngine,
    config: Config,
    events: EventBus,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    history: Mutex<VecDeque<FallbackRecord>>,
    stats: Mutex<FallbackStats>,
}

impl FallbackManager {
    pub fn new(
        sequential: SequentialEngine,
        discussion: DiscussionEngine,
        single: SingleEngine,
        config: Config,
        events: EventBus,
    ) -> Self {
        Self {
            sequential,
            discussion,
            single,
            config,
            events,
            breakers: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            stats: Mutex::new(FallbackStats::default()),
        }
    }

    /// Execute the task, degrading as needed. Never fails: the terminal
    /// emergency template answers when every chain level is exhausted.
    pub async fn execute(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        primary: Approach,
    ) -> ExecutionResult {
        let chain = self.build_chain(request, primary);
        let max_retries = self.config.fallback.max_retries.max(1);
        let mut warnings = Vec::new();
        let mut last_error: Option<String> = None;

        for (level, attempt) in chain.iter().enumerate() {
            let level = level as u32;
            let operation = operation_key(attempt.approach(), request.task_type);

            if !self.breaker_allows(&operation) {
                warn!(
                    task_id = %request.id,
                    level,
                    operation = %operation,
                    "Skipping fallback level, circuit open"
                );
                warnings.push(format!(
                    "skipped {} ({} circuit open)",
                    attempt.describe(),
                    operation
                ));
                continue;
            }

            if level > 0 {
                self.record_fallback(request, primary, attempt, level, &last_error);
            }

            for attempt_number in 1..=max_retries {
                if attempt_number > 1 {
                    self.retry_delay(attempt_number).await;
                    if !self.breaker_allows(&operation) {
                        warnings.push(format!(
                            "stopped retrying {} ({} circuit open)",
                            attempt.describe(),
                            operation
                        ));
                        break;
                    }
                }

                match self.run_attempt(request, context_summary, attempt).await {
                    Ok(mut result) => {
                        self.record_operation_success(&operation);
                        result.fallback_level = level;
                        if level > 0 {
                            warnings.push(format!(
                                "degraded to {} at fallback level {}",
                                attempt.describe(),
                                level
                            ));
                        }
                        result.warnings = warnings;
                        return result;
                    }
                    Err(e) => {
                        warn!(
                            task_id = %request.id,
                            level,
                            attempt = %attempt.describe(),
                            try_number = attempt_number,
                            retryable = e.is_retryable(),
                            error = %e,
                            "Fallback level attempt failed"
                        );
                        self.record_operation_failure(&operation);
                        let retryable = e.is_retryable();
                        last_error = Some(e.to_string());
                        if !retryable {
                            break;
                        }
                    }
                }
            }
        }

        // Terminal template: always succeeds
        self.record_emergency(request, primary, &last_error);
        let answer = emergency_answer(request);
        warnings.push(
            "all strategies and providers failed; this is a canned emergency answer".to_string(),
        );

        info!(
            task_id = %request.id,
            "Answered with terminal emergency template"
        );

        ExecutionResult {
            result: answer.text,
            confidence: answer.confidence,
            approach: Approach::EmergencyTemplate,
            provider: None,
            fallback_level: EMERGENCY_FALLBACK_LEVEL,
            tokens_used: 0,
            warnings,
            insights: Vec::new(),
        }
    }

    /// Build the fallback chain for a primary approach.
    fn build_chain(&self, request: &TaskRequest, primary: Approach) -> Vec<Attempt> {
        let fast = Provider::fastest();
        let order = &self.config.fallback.provider_order;
        let first = *order.first().unwrap_or(&fast);

        let mut chain: Vec<Attempt> = Vec::new();

        // Urgent work gets a fast cheap attempt before anything elaborate
        if request.priority >= TaskPriority::Critical {
            chain.push(Attempt::Single {
                provider: fast,
                emergency: true,
            });
        }

        match primary {
            Approach::SequentialThinking => {
                chain.push(Attempt::Sequential {
                    simplified: false,
                    provider: first,
                });
                chain.push(Attempt::Sequential {
                    simplified: true,
                    provider: first.alternate(),
                });
                chain.push(Attempt::Discussion {
                    limited: true,
                    provider: fast,
                });
                chain.push(Attempt::Single {
                    provider: fast,
                    emergency: false,
                });
            }
            Approach::MultiAgentDiscussion => {
                chain.push(Attempt::Discussion {
                    limited: false,
                    provider: first,
                });
                chain.push(Attempt::Sequential {
                    simplified: false,
                    provider: first,
                });
                chain.push(Attempt::Discussion {
                    limited: true,
                    provider: first.alternate(),
                });
                chain.push(Attempt::Single {
                    provider: fast,
                    emergency: false,
                });
            }
            Approach::SingleAgent | Approach::EmergencyTemplate => {
                for provider in order {
                    chain.push(Attempt::Single {
                        provider: *provider,
                        emergency: false,
                    });
                }
            }
        }

        chain
    }

    async fn run_attempt(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        attempt: &Attempt,
    ) -> OrchResult<ExecutionResult> {
        match attempt {
            Attempt::Sequential {
                simplified,
                provider,
            } => {
                let mut params = SequentialParams::from_config(&self.config.sequential)
                    .with_provider(*provider);
                if *simplified {
                    params = params.simplified();
                }
                let outcome = self.sequential.run(request, context_summary, params).await?;
                let insights: Vec<String> = outcome
                    .steps
                    .iter()
                    .filter(|s| !s.conclusion.is_empty())
                    .map(|s| s.conclusion.clone())
                    .collect();
                Ok(ExecutionResult {
                    result: outcome.conclusion,
                    confidence: outcome.total_confidence,
                    approach: Approach::SequentialThinking,
                    provider: Some(outcome.provider),
                    fallback_level: 0,
                    tokens_used: outcome.tokens_used,
                    warnings: Vec::new(),
                    insights,
                })
            }
            Attempt::Discussion { limited, provider } => {
                let mut params = DiscussionParams::from_config(&self.config.discussion);
                if *limited {
                    params = params.limited().with_forced_provider(*provider);
                }
                let outcome = self.discussion.run(request, context_summary, params).await?;
                let insights: Vec<String> = outcome
                    .rounds
                    .iter()
                    .flat_map(|r| r.insights.iter().cloned())
                    .collect();
                Ok(ExecutionResult {
                    result: outcome.consensus,
                    confidence: outcome.confidence,
                    approach: Approach::MultiAgentDiscussion,
                    provider: Some(outcome.provider),
                    fallback_level: 0,
                    tokens_used: outcome.tokens_used,
                    warnings: Vec::new(),
                    insights,
                })
            }
            Attempt::Single {
                provider,
                emergency,
            } => {
                let params = if *emergency {
                    SingleParams::emergency()
                } else {
                    SingleParams::new().with_provider(*provider)
                };
                let outcome = self.single.run(request, context_summary, params).await?;
                Ok(ExecutionResult {
                    result: outcome.result,
                    confidence: outcome.confidence,
                    approach: Approach::SingleAgent,
                    provider: Some(outcome.provider),
                    fallback_level: 0,
                    tokens_used: outcome.tokens_used,
                    warnings: Vec::new(),
                    insights: Vec::new(),
                })
            }
        }
    }

    fn with_breaker<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut CircuitBreaker) -> T,
    ) -> Option<T> {
        let mut breakers = self.breakers.lock().ok()?;
        let breaker = breakers.entry(operation.to_string()).or_insert_with(|| {
            CircuitBreaker::new(
                self.config.fallback.circuit_breaker_threshold,
                self.config.fallback.circuit_breaker_reset_ms,
            )
        });
        Some(f(breaker))
    }

    fn breaker_allows(&self, operation: &str) -> bool {
        self.with_breaker(operation, |b| b.can_execute()).unwrap_or(true)
    }

    fn record_operation_success(&self, operation: &str) {
        if self.with_breaker(operation, |b| b.record_success()) == Some(true) {
            self.events.emit(OrchestrationEvent::CircuitClosed {
                operation: operation.to_string(),
            });
        }
    }

    fn record_operation_failure(&self, operation: &str) {
        if self.with_breaker(operation, |b| b.record_failure()) == Some(true) {
            self.events.emit(OrchestrationEvent::CircuitOpened {
                operation: operation.to_string(),
            });
        }
    }

    fn record_fallback(
        &self,
        request: &TaskRequest,
        primary: Approach,
        attempt: &Attempt,
        level: u32,
        last_error: &Option<String>,
    ) {
        let record = FallbackRecord {
            task_id: request.id.clone(),
            from: primary,
            to: attempt.approach(),
            level,
            reason: last_error
                .clone()
                .unwrap_or_else(|| "previous level skipped".to_string()),
            at: Utc::now(),
        };

        self.events.emit(OrchestrationEvent::FallbackTriggered {
            task_id: request.id.clone(),
            level,
            from: primary,
            to: attempt.approach(),
        });

        if let Ok(mut stats) = self.stats.lock() {
            stats.total_fallbacks += 1;
            *stats.by_level.entry(level).or_insert(0) += 1;
        }
        if let Ok(mut history) = self.history.lock() {
            history.push_back(record);
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
        }
    }

    fn record_emergency(
        &self,
        request: &TaskRequest,
        primary: Approach,
        last_error: &Option<String>,
    ) {
        self.events.emit(OrchestrationEvent::FallbackTriggered {
            task_id: request.id.clone(),
            level: EMERGENCY_FALLBACK_LEVEL,
            from: primary,
            to: Approach::EmergencyTemplate,
        });

        if let Ok(mut stats) = self.stats.lock() {
            stats.total_fallbacks += 1;
            stats.emergency_answers += 1;
            *stats
                .by_level
                .entry(EMERGENCY_FALLBACK_LEVEL)
                .or_insert(0) += 1;
        }
        if let Ok(mut history) = self.history.lock() {
            history.push_back(FallbackRecord {
                task_id: request.id.clone(),
                from: primary,
                to: Approach::EmergencyTemplate,
                level: EMERGENCY_FALLBACK_LEVEL,
                reason: last_error
                    .clone()
                    .unwrap_or_else(|| "all levels skipped".to_string()),
                at: Utc::now(),
            });
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
        }
    }

    /// Backoff before retry `attempt_number` (2-based) of the same level.
    async fn retry_delay(&self, attempt_number: u32) {
        let delays = &self.config.fallback.retry_delays_ms;
        if delays.is_empty() {
            return;
        }
        let index = (attempt_number.saturating_sub(2) as usize).min(delays.len() - 1);
        tokio::time::sleep(Duration::from_millis(delays[index])).await;
    }

    /// Current circuit state per operation key.
    pub fn breaker_states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .lock()
            .map(|breakers| {
                breakers
                    .iter()
                    .map(|(op, b)| (op.clone(), b.state()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> FallbackStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Recent fallback transitions, oldest first.
    pub fn history(&self) -> Vec<FallbackRecord> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::EngineCore;
    use crate::invoker::{MockModelInvoker, ModelResponse};
    use crate::types::TaskType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn manager_with_events(
        mock: MockModelInvoker,
        mut config: Config,
        events: EventBus,
    ) -> FallbackManager {
        config.fallback.retry_delays_ms = vec![1, 1, 1];
        let core = EngineCore::new(Arc::new(mock), events.clone());
        FallbackManager::new(
            SequentialEngine::new(core.clone()),
            DiscussionEngine::new(core.clone()),
            SingleEngine::new(core),
            config,
            events,
        )
    }

    fn manager_with(mock: MockModelInvoker, config: Config) -> FallbackManager {
        manager_with_events(mock, config, EventBus::new())
    }

    fn failing_mock() -> MockModelInvoker {
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(|_, _| {
            Err(crate::error::InvokerError::Unavailable {
                message: "down".to_string(),
                retries: 3,
            })
        });
        mock
    }

    fn counting_failing_mock(calls: Arc<AtomicU32>) -> MockModelInvoker {
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(crate::error::InvokerError::Unavailable {
                message: "down".to_string(),
                retries: 3,
            })
        });
        mock
    }

    #[tokio::test]
    async fn test_all_providers_failing_reaches_emergency_template() {
        let manager = manager_with(failing_mock(), Config::default());
        let request = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");

        let result = manager
            .execute(&request, None, Approach::MultiAgentDiscussion)
            .await;

        assert_eq!(result.approach, Approach::EmergencyTemplate);
        assert_eq!(result.fallback_level, EMERGENCY_FALLBACK_LEVEL);
        assert!(!result.result.is_empty());
        assert!((0.3..=0.5).contains(&result.confidence));
        assert_eq!(manager.stats().emergency_answers, 1);
    }

    #[tokio::test]
    async fn test_primary_success_is_level_zero() {
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(|_, _| {
            Ok(ModelResponse {
                content: "All clear.\nCONFIDENCE: 0.8".to_string(),
                confidence: None,
                provider: Provider::AnthropicClaude,
                tokens_used: 20,
                latency_ms: 5,
            })
        });
        let manager = manager_with(mock, Config::default());
        let request = TaskRequest::new(TaskType::General, "Quick check");

        let result = manager.execute(&request, None, Approach::SingleAgent).await;

        assert_eq!(result.fallback_level, 0);
        assert_eq!(result.approach, Approach::SingleAgent);
        assert!(result.warnings.is_empty());
        assert_eq!(manager.stats().total_fallbacks, 0);
    }

    #[tokio::test]
    async fn test_failing_discussion_walks_chain_in_order() {
        let manager = manager_with(failing_mock(), Config::default());
        let request = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");

        let _ = manager
            .execute(&request, None, Approach::MultiAgentDiscussion)
            .await;

        let history = manager.history();
        let approaches: Vec<Approach> = history.iter().map(|r| r.to).collect();
        // Discussion primary falls back: sequential, limited discussion,
        // single-agent, then the terminal template
        assert_eq!(
            approaches,
            vec![
                Approach::SequentialThinking,
                Approach::MultiAgentDiscussion,
                Approach::SingleAgent,
                Approach::EmergencyTemplate,
            ]
        );
    }

    #[tokio::test]
    async fn test_retries_level_up_to_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut config = Config::default();
        config.fallback.max_retries = 2;
        config.fallback.circuit_breaker_threshold = 10;
        let manager = manager_with(counting_failing_mock(calls.clone()), config);
        let request = TaskRequest::new(TaskType::General, "Check something");

        let result = manager.execute(&request, None, Approach::SingleAgent).await;

        // Two single-agent levels, two attempts each, then the template
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.approach, Approach::EmergencyTemplate);
    }

    #[tokio::test]
    async fn test_non_retryable_error_skips_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Err(crate::error::InvokerError::InvalidRequest {
                message: "bad payload".to_string(),
            })
        });
        let mut config = Config::default();
        config.fallback.circuit_breaker_threshold = 10;
        let manager = manager_with(mock, config);
        let request = TaskRequest::new(TaskType::General, "Check something");

        let _ = manager.execute(&request, None, Approach::SingleAgent).await;

        // One attempt per level: a malformed request never improves on retry
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadlocked_discussion_degrades_to_sequential() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(move |messages, _| {
            let system = messages.first().map(|m| m.content.clone()).unwrap_or_default();
            let content = if system.contains("step by step") {
                "CONCLUSION: Stage the works: make safe, dry out, then repair.\nCONFIDENCE: 0.9\nNEXT_STEPS: none\nCOMPLETION_STATUS: complete".to_string()
            } else {
                // Panel turns never agree and never gain confidence
                let n = counter_clone.fetch_add(1, Ordering::SeqCst);
                format!(
                    "ANALYSIS: Looked at the site.\nREASONING: Standard case.\nRECOMMENDATIONS:\n- unique position number {}\nCONFIDENCE: 0.3\nDISAGREEMENTS: none\nQUESTIONS: none",
                    n * 7 + 1
                )
            };
            Ok(ModelResponse {
                content,
                confidence: None,
                provider: Provider::AnthropicClaude,
                tokens_used: 40,
                latency_ms: 10,
            })
        });
        let manager = manager_with(mock, Config::default());
        let request = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");

        let result = manager
            .execute(&request, None, Approach::MultiAgentDiscussion)
            .await;

        // The deadlock is fatal for the discussion level, not for the task
        assert_eq!(result.approach, Approach::SequentialThinking);
        assert_eq!(result.fallback_level, 1);
        assert!(result
            .insights
            .iter()
            .any(|i| i.contains("Stage the works")));
        let history = manager.history();
        assert_eq!(history[0].to, Approach::SequentialThinking);
        assert!(history[0].reason.contains("deadlocked"));
    }

    #[tokio::test]
    async fn test_critical_priority_prepends_emergency_single() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(ModelResponse {
                content: "Evacuate now.\nCONFIDENCE: 0.9".to_string(),
                confidence: None,
                provider: Provider::AnthropicClaude,
                tokens_used: 10,
                latency_ms: 5,
            })
        });
        let manager = manager_with(mock, Config::default());
        let request = TaskRequest::new(TaskType::EmergencyRouting, "Gas leak at the site")
            .with_priority(TaskPriority::Emergency);

        let result = manager
            .execute(&request, None, Approach::SequentialThinking)
            .await;

        // The prepended emergency single-agent answers with one call
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.approach, Approach::SingleAgent);
        assert_eq!(result.fallback_level, 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_per_operation_after_repeated_failures() {
        let mut config = Config::default();
        config.fallback.circuit_breaker_threshold = 2;
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let manager = manager_with_events(failing_mock(), config, events);
        let request = TaskRequest::new(TaskType::General, "Check something");

        let _ = manager.execute(&request, None, Approach::SingleAgent).await;

        let states = manager.breaker_states();
        assert_eq!(
            states.get("single-agent_general"),
            Some(&CircuitState::Open)
        );

        let mut saw_open = false;
        while let Ok(event) = rx.try_recv() {
            if let OrchestrationEvent::CircuitOpened { operation } = event {
                assert_eq!(operation, "single-agent_general");
                saw_open = true;
            }
        }
        assert!(saw_open);
    }
}

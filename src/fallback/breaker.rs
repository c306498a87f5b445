//! Per-provider circuit breaker.
//!
//! Standard closed/open/half-open state machine: the circuit opens after a
//! run of consecutive failures, blocks calls until the reset window passes,
//! then admits one trial call. A trial success closes the circuit; a trial
//! failure reopens it.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

/// State of a provider's circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls allowed
    Closed,
    /// Blocking calls after too many failures
    Open,
    /// Admitting one trial call
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Circuit breaker guarding one provider.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    total_failures: u64,
    total_successes: u64,
    last_failure: Option<Instant>,
    failure_threshold: u32,
    reset_time: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_time_ms: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_failure: None,
            failure_threshold: failure_threshold.max(1),
            reset_time: Duration::from_millis(reset_time_ms),
        }
    }

    /// Whether a call may proceed. An open circuit past its reset window
    /// transitions to half-open and admits the call as a trial.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let ready = self
                    .last_failure
                    .map(|t| t.elapsed() >= self.reset_time)
                    .unwrap_or(true);
                if ready {
                    self.transition_to(CircuitState::HalfOpen);
                }
                ready
            }
        }
    }

    /// Record a successful call. Resets the failure run and closes the circuit.
    ///
    /// Returns `true` if the circuit closed as a result.
    pub fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        self.total_successes += 1;

        if self.state != CircuitState::Closed {
            self.transition_to(CircuitState::Closed);
            return true;
        }
        false
    }

    /// Record a failed call.
    ///
    /// Returns `true` if the circuit opened as a result.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_failure = Some(Instant::now());

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    self.transition_to(CircuitState::Open);
                    return true;
                }
                false
            }
            CircuitState::HalfOpen => {
                // Trial failed
                self.transition_to(CircuitState::Open);
                true
            }
            CircuitState::Open => false,
        }
    }

    fn transition_to(&mut self, new_state: CircuitState) {
        info!(
            from = %self.state,
            to = %new_state,
            consecutive_failures = self.consecutive_failures,
            "Circuit breaker state transition"
        );
        self.state = new_state;
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }
}

//! Typed orchestration events.
//!
//! A lossy broadcast bus: subscribers that fall behind miss events, and
//! sending with no subscribers is not an error. Consumers get structured
//! variants rather than string topics so matching is exhaustive.

use tokio::sync::broadcast;

use crate::monitor::Alert;
use crate::types::Approach;

/// Capacity of the broadcast channel per subscriber
const CHANNEL_CAPACITY: usize = 256;

/// Something observable happened inside the orchestration service.
#[derive(Debug, Clone)]
pub enum OrchestrationEvent {
    TaskStarted {
        task_id: String,
        approach: Approach,
    },
    TaskCompleted {
        task_id: String,
        approach: Approach,
        confidence: f64,
        duration_ms: u64,
    },
    CacheHit {
        task_id: String,
        similarity_partition: &'static str,
    },
    FallbackTriggered {
        task_id: String,
        level: u32,
        from: Approach,
        to: Approach,
    },
    /// One sequential reasoning step finished.
    ThinkingStep {
        task_id: String,
        step: u32,
        confidence: f64,
    },
    /// One agent spoke during a discussion round.
    AgentResponse {
        task_id: String,
        round: u32,
        agent: String,
        confidence: f64,
    },
    /// A discussion panel converged.
    ConsensusReached {
        task_id: String,
        rounds: u32,
        convergence: f64,
    },
    /// Coarse progress through a strategy run.
    ProgressUpdate {
        task_id: String,
        stage: String,
        percent: u8,
    },
    /// Circuit breaker opened for an operation key (`approach_tasktype`).
    CircuitOpened {
        operation: String,
    },
    CircuitClosed {
        operation: String,
    },
    AlertRaised {
        alert: Alert,
    },
    ContextUpdated {
        context_id: String,
    },
}

/// Broadcast bus for orchestration events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestrationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Emit an event. No-op when nobody is listening.
    pub fn emit(&self, event: OrchestrationEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(OrchestrationEvent::CircuitOpened {
            operation: "single-agent_general".to_string(),
        });

        match rx.recv().await.unwrap() {
            OrchestrationEvent::CircuitOpened { operation } => {
                assert_eq!(operation, "single-agent_general");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit(OrchestrationEvent::ContextUpdated {
            context_id: "ctx-1".to_string(),
        });
    }
}

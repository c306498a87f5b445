//! Task routing across reasoning strategies.
//!
//! The router scores complexity and urgency on a 1-10 scale, then applies a
//! fixed rule order: urgency forces the fast path, accuracy plus complexity
//! earns a discussion, complexity alone earns sequential thinking, keyword
//! heuristics catch the rest, and everything else takes the default approach.
//! Recent per-approach success rates can demote a struggling approach to a
//! simpler one.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RoutingConfig;
use crate::types::{Approach, TaskRequest};

/// Number of recent outcomes tracked per approach
const HISTORY_WINDOW: usize = 20;
/// Minimum samples before a poor success rate can demote an approach
const MIN_SAMPLES_FOR_DEMOTION: usize = 5;
/// Success rate below which an approach is demoted
const DEMOTION_SUCCESS_RATE: f64 = 0.5;

const SEQUENTIAL_KEYWORDS: [&str; 3] = ["calculate", "optimize", "compare"];
const DISCUSSION_KEYWORDS: [&str; 3] = ["stakeholder", "dispute", "negotiate"];
const MULTI_FACTOR_KEYWORDS: [&str; 4] = ["multiple", "complex", "interdependent", "stakeholder"];

const LONG_DESCRIPTION_CHARS: usize = 400;
const TIGHT_DEADLINE_MS: u64 = 10_000;

/// Routing decision with the scores that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub approach: Approach,
    pub complexity: u8,
    pub urgency: u8,
    pub reason: String,
}

/// Chooses a reasoning strategy for each task.
pub struct IntelligentRouter {
    config: RoutingConfig,
    history: Mutex<HashMap<Approach, VecDeque<bool>>>,
}

impl IntelligentRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            config,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Score task complexity on a 1-10 scale.
    pub fn assess_complexity(&self, request: &TaskRequest) -> u8 {
        let mut score = request.task_type.base_complexity();

        if request.description.len() > LONG_DESCRIPTION_CHARS {
            score += 1;
        }

        let lower = request.description.to_lowercase();
        if MULTI_FACTOR_KEYWORDS.iter().any(|k| lower.contains(k)) {
            score += 1;
        }

        score.clamp(1, 10)
    }

    /// Score task urgency on a 1-10 scale.
    pub fn assess_urgency(&self, request: &TaskRequest) -> u8 {
        let mut score = request.priority.urgency_score();

        if request.max_response_time_ms < TIGHT_DEADLINE_MS {
            score += 1;
        }

        score.clamp(1, 10)
    }

    /// Choose a strategy for the task.
    pub fn route(&self, request: &TaskRequest) -> RoutingDecision {
        let complexity = self.assess_complexity(request);
        let urgency = self.assess_urgency(request);

        let (approach, reason) = self.decide(request, complexity, urgency);
        let (approach, reason) = self.apply_history_demotion(approach, reason);

        debug!(
            task_id = %request.id,
            approach = %approach,
            complexity,
            urgency,
            reason = %reason,
            "Routed task"
        );

        RoutingDecision {
            approach,
            complexity,
            urgency,
            reason,
        }
    }

    fn decide(&self, request: &TaskRequest, complexity: u8, urgency: u8) -> (Approach, String) {
        if urgency >= self.config.urgency_threshold {
            return (
                Approach::SingleAgent,
                format!(
                    "urgency {} >= threshold {}, speed takes precedence",
                    urgency, self.config.urgency_threshold
                ),
            );
        }

        if request.required_accuracy >= self.config.accuracy_threshold
            && complexity >= self.config.complexity_threshold
        {
            return (
                Approach::MultiAgentDiscussion,
                format!(
                    "required accuracy {:.2} and complexity {} both above thresholds",
                    request.required_accuracy, complexity
                ),
            );
        }

        if complexity >= self.config.complexity_threshold {
            return (
                Approach::SequentialThinking,
                format!(
                    "complexity {} >= threshold {}",
                    complexity, self.config.complexity_threshold
                ),
            );
        }

        let lower = request.description.to_lowercase();
        if let Some(keyword) = SEQUENTIAL_KEYWORDS.iter().find(|k| lower.contains(*k)) {
            return (
                Approach::SequentialThinking,
                format!("description contains '{}'", keyword),
            );
        }
        if let Some(keyword) = DISCUSSION_KEYWORDS.iter().find(|k| lower.contains(*k)) {
            return (
                Approach::MultiAgentDiscussion,
                format!("description contains '{}'", keyword),
            );
        }

        (
            self.config.default_approach,
            "no routing rule fired, using default approach".to_string(),
        )
    }

    fn apply_history_demotion(&self, approach: Approach, reason: String) -> (Approach, String) {
        let Ok(history) = self.history.lock() else {
            return (approach, reason);
        };
        let Some(outcomes) = history.get(&approach) else {
            return (approach, reason);
        };
        if outcomes.len() < MIN_SAMPLES_FOR_DEMOTION {
            return (approach, reason);
        }

        let successes = outcomes.iter().filter(|s| **s).count();
        let rate = successes as f64 / outcomes.len() as f64;
        if rate >= DEMOTION_SUCCESS_RATE {
            return (approach, reason);
        }

        let demoted = match approach {
            Approach::MultiAgentDiscussion => Approach::SequentialThinking,
            Approach::SequentialThinking => Approach::SingleAgent,
            other => other,
        };
        if demoted == approach {
            return (approach, reason);
        }

        (
            demoted,
            format!(
                "{}; demoted from {} (recent success rate {:.0}%)",
                reason,
                approach,
                rate * 100.0
            ),
        )
    }

    /// Record how an approach's execution turned out, for future demotion.
    pub fn record_outcome(&self, approach: Approach, success: bool) {
        if let Ok(mut history) = self.history.lock() {
            let outcomes = history.entry(approach).or_default();
            outcomes.push_back(success);
            while outcomes.len() > HISTORY_WINDOW {
                outcomes.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::{TaskPriority, TaskType};

    fn router() -> IntelligentRouter {
        IntelligentRouter::new(Config::default().routing)
    }

    #[test]
    fn test_complexity_scoring() {
        let r = router();
        let req = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");
        assert_eq!(r.assess_complexity(&req), 7);

        let long = "x".repeat(500);
        let req = TaskRequest::new(TaskType::DamageAssessment, long);
        assert_eq!(r.assess_complexity(&req), 8);

        let req = TaskRequest::new(
            TaskType::InsuranceClaim,
            "Complex claim with multiple interdependent stakeholder issues",
        );
        // Base 8 + multi-factor keyword, long description not reached
        assert_eq!(r.assess_complexity(&req), 9);
    }

    #[test]
    fn test_urgency_scoring() {
        let r = router();
        let req = TaskRequest::new(TaskType::General, "check")
            .with_priority(TaskPriority::Emergency);
        assert_eq!(r.assess_urgency(&req), 10);

        let req = TaskRequest::new(TaskType::General, "check")
            .with_priority(TaskPriority::High)
            .with_max_response_time_ms(5_000);
        assert_eq!(r.assess_urgency(&req), 8);
    }

    #[test]
    fn test_urgency_forces_single_agent() {
        let r = router();
        let req = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage")
            .with_priority(TaskPriority::Emergency)
            .with_required_accuracy(0.95);
        let decision = r.route(&req);
        assert_eq!(decision.approach, Approach::SingleAgent);
    }

    #[test]
    fn test_accuracy_and_complexity_pick_discussion() {
        let r = router();
        let req = TaskRequest::new(TaskType::InsuranceClaim, "Review rejected claim")
            .with_required_accuracy(0.95);
        let decision = r.route(&req);
        assert_eq!(decision.approach, Approach::MultiAgentDiscussion);
    }

    #[test]
    fn test_complexity_picks_sequential() {
        let r = router();
        let req = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage at 123 Smith St");
        let decision = r.route(&req);
        assert_eq!(decision.approach, Approach::SequentialThinking);
    }

    #[test]
    fn test_keyword_heuristics() {
        let r = router();
        let req = TaskRequest::new(TaskType::General, "Calculate drying time for carpets");
        assert_eq!(r.route(&req).approach, Approach::SequentialThinking);

        let req = TaskRequest::new(TaskType::General, "Negotiate scope with the insurer");
        assert_eq!(r.route(&req).approach, Approach::MultiAgentDiscussion);
    }

    #[test]
    fn test_default_approach() {
        let r = router();
        let req = TaskRequest::new(TaskType::General, "Quick summary of the site visit");
        let decision = r.route(&req);
        assert_eq!(decision.approach, Approach::SingleAgent);
        assert!(decision.reason.contains("default"));
    }

    #[test]
    fn test_history_demotes_failing_approach() {
        let r = router();
        for _ in 0..6 {
            r.record_outcome(Approach::SequentialThinking, false);
        }

        let req = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");
        let decision = r.route(&req);
        assert_eq!(decision.approach, Approach::SingleAgent);
        assert!(decision.reason.contains("demoted"));
    }

    #[test]
    fn test_history_needs_minimum_samples() {
        let r = router();
        for _ in 0..3 {
            r.record_outcome(Approach::SequentialThinking, false);
        }
        let req = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");
        assert_eq!(r.route(&req).approach, Approach::SequentialThinking);
    }
}

//! Core domain types shared across the orchestration engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Category of disaster-recovery analysis task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    DamageAssessment,
    SafetyCheck,
    CostEstimate,
    EmergencyRouting,
    InsuranceClaim,
    RecoveryPlanning,
    General,
}

impl TaskType {
    /// Baseline complexity contribution for routing (1-10 scale).
    pub fn base_complexity(&self) -> u8 {
        match self {
            TaskType::DamageAssessment => 7,
            TaskType::InsuranceClaim => 8,
            TaskType::RecoveryPlanning => 8,
            TaskType::SafetyCheck => 6,
            TaskType::CostEstimate => 5,
            TaskType::EmergencyRouting => 4,
            TaskType::General => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DamageAssessment => "damage-assessment",
            TaskType::SafetyCheck => "safety-check",
            TaskType::CostEstimate => "cost-estimate",
            TaskType::EmergencyRouting => "emergency-routing",
            TaskType::InsuranceClaim => "insurance-claim",
            TaskType::RecoveryPlanning => "recovery-planning",
            TaskType::General => "general",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority of a task request, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
    Emergency,
}

impl TaskPriority {
    /// Urgency score contribution (1-10 scale).
    pub fn urgency_score(&self) -> u8 {
        match self {
            TaskPriority::Emergency => 10,
            TaskPriority::Critical => 9,
            TaskPriority::High => 7,
            TaskPriority::Medium => 5,
            TaskPriority::Low => 3,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
            TaskPriority::Emergency => "emergency",
        };
        write!(f, "{}", s)
    }
}

/// Reasoning strategy selected by the router (or reached via fallback)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Approach {
    SingleAgent,
    SequentialThinking,
    MultiAgentDiscussion,
    /// Canned terminal-fallback answer; never chosen by the router.
    EmergencyTemplate,
}

impl Approach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approach::SingleAgent => "single-agent",
            Approach::SequentialThinking => "sequential-thinking",
            Approach::MultiAgentDiscussion => "multi-agent-discussion",
            Approach::EmergencyTemplate => "emergency-template",
        }
    }

    /// Cost multiplier relative to a single model call.
    pub fn cost_multiplier(&self) -> f64 {
        match self {
            Approach::SingleAgent => 1.0,
            Approach::SequentialThinking => 2.5,
            Approach::MultiAgentDiscussion => 3.0,
            Approach::EmergencyTemplate => 0.01,
        }
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model provider backing an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// Low-latency provider, preferred for urgent work
    #[serde(rename = "anthropic-claude")]
    AnthropicClaude,
    /// Deep-reasoning provider, preferred for complex analysis
    #[serde(rename = "openrouter-gpt-oss-120b")]
    OpenRouterGptOss120b,
}

impl Provider {
    /// Provider with the lowest expected latency.
    pub fn fastest() -> Self {
        Provider::AnthropicClaude
    }

    /// All providers in default fallback order.
    pub fn all() -> [Provider; 2] {
        [Provider::AnthropicClaude, Provider::OpenRouterGptOss120b]
    }

    /// The other provider, used for step recovery.
    pub fn alternate(&self) -> Self {
        match self {
            Provider::AnthropicClaude => Provider::OpenRouterGptOss120b,
            Provider::OpenRouterGptOss120b => Provider::AnthropicClaude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::AnthropicClaude => "anthropic-claude",
            Provider::OpenRouterGptOss120b => "openrouter-gpt-oss-120b",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A task submitted to the orchestration service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Unique task ID
    pub id: String,
    /// Category of analysis
    pub task_type: TaskType,
    /// Free-text description of the task
    pub description: String,
    /// Priority, drives urgency scoring and emergency paths
    pub priority: TaskPriority,
    /// Required accuracy (0.0-1.0); high values bias toward discussion
    pub required_accuracy: f64,
    /// Response-time budget in milliseconds
    pub max_response_time_ms: u64,
    /// Conversation context to attach to (created if absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Free-form metadata (location hints, damage kinds, season)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TaskRequest {
    /// Create a request with defaults: medium priority, 0.8 accuracy, 60s budget.
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type,
            description: description.into(),
            priority: TaskPriority::Medium,
            required_accuracy: 0.8,
            max_response_time_ms: 60_000,
            context_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_required_accuracy(mut self, accuracy: f64) -> Self {
        self.required_accuracy = accuracy.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_response_time_ms(mut self, ms: u64) -> Self {
        self.max_response_time_ms = ms.max(1_000);
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Final outcome of an orchestrated task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    /// Always true for a completed orchestration, including template fallback
    pub success: bool,
    /// The analysis text
    pub result: String,
    /// Confidence in the result (0.0-1.0)
    pub confidence: f64,
    /// Strategy that produced the result
    pub approach: Approach,
    /// Provider that served the final answer, if a model was involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// How far down the fallback chain execution went (0 = primary, 99 = template)
    pub fallback_level: u32,
    pub tokens_used: u64,
    pub duration_ms: u64,
    pub cache_hit: bool,
    /// Estimated cost in AUD
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Fallback level recorded when the terminal emergency template answers.
pub const EMERGENCY_FALLBACK_LEVEL: u32 = 99;

/// Estimate task cost in AUD from the approach used and fallback depth.
///
/// Base unit cost covers a single model call; deeper fallbacks add a small
/// penalty per level to reflect wasted attempts.
pub fn estimate_cost(approach: Approach, fallback_level: u32) -> f64 {
    const BASE_COST: f64 = 0.10;
    const FALLBACK_PENALTY: f64 = 0.05;

    let level = if fallback_level == EMERGENCY_FALLBACK_LEVEL {
        0
    } else {
        fallback_level
    };
    BASE_COST * approach.cost_multiplier() + level as f64 * FALLBACK_PENALTY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Emergency > TaskPriority::Critical);
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::Low < TaskPriority::Medium);
    }

    #[test]
    fn test_request_builder_clamps() {
        let req = TaskRequest::new(TaskType::General, "test")
            .with_required_accuracy(1.5)
            .with_max_response_time_ms(10);
        assert_eq!(req.required_accuracy, 1.0);
        assert_eq!(req.max_response_time_ms, 1_000);
    }

    #[test]
    fn test_provider_alternate_is_symmetric() {
        for p in Provider::all() {
            assert_eq!(p.alternate().alternate(), p);
            assert_ne!(p.alternate(), p);
        }
    }

    #[test]
    fn test_cost_estimation() {
        assert!((estimate_cost(Approach::SingleAgent, 0) - 0.10).abs() < 1e-9);
        assert!((estimate_cost(Approach::SequentialThinking, 0) - 0.25).abs() < 1e-9);
        assert!((estimate_cost(Approach::MultiAgentDiscussion, 2) - 0.40).abs() < 1e-9);
        // Template answers cost almost nothing and ignore the sentinel level
        assert!(estimate_cost(Approach::EmergencyTemplate, EMERGENCY_FALLBACK_LEVEL) < 0.01);
    }

    #[test]
    fn test_serde_kebab_case() {
        let json = serde_json::to_string(&TaskType::DamageAssessment).unwrap();
        assert_eq!(json, "\"damage-assessment\"");
        let json = serde_json::to_string(&Approach::SequentialThinking).unwrap();
        assert_eq!(json, "\"sequential-thinking\"");
        let json = serde_json::to_string(&Provider::OpenRouterGptOss120b).unwrap();
        assert_eq!(json, "\"openrouter-gpt-oss-120b\"");
    }
}

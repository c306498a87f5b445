//! Conversation context tracking.
//!
//! Each task can attach to a conversation context that accumulates messages,
//! insights, decisions, and detected stakeholders across related tasks. All
//! collections are bounded FIFO; a cleanup pass drops finished contexts past
//! the age limit and trims the store when it outgrows its cap.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ContextConfig;
use crate::error::{OrchResult, OrchestrationError};
use crate::types::TaskType;
use uuid::Uuid;

/// Stakeholder keywords detected in task descriptions and messages
const STAKEHOLDER_KEYWORDS: [&str; 9] = [
    "homeowner",
    "tenant",
    "landlord",
    "insurance",
    "contractor",
    "emergency services",
    "council",
    "neighbour",
    "business owner",
];

/// A single message in a context's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Where the current task stands within a context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextProgress {
    pub stage: String,
    pub percent: u8,
    pub activity: String,
}

/// Accumulated state for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: String,
    pub task_type: TaskType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ContextMessage>,
    pub insights: Vec<String>,
    pub decisions: Vec<String>,
    pub stakeholders: Vec<String>,
    #[serde(default)]
    pub progress: ContextProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
    /// Set once a final result lands; terminal contexts only age out
    pub terminal: bool,
}

impl ConversationContext {
    fn new(task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            task_type,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            insights: Vec::new(),
            decisions: Vec::new(),
            stakeholders: Vec::new(),
            progress: ContextProgress::default(),
            final_result: None,
            terminal: false,
        }
    }

    /// Compact digest fed into prompts.
    pub fn summary_for_prompt(&self) -> String {
        let mut parts = Vec::new();

        if !self.stakeholders.is_empty() {
            parts.push(format!("Stakeholders: {}", self.stakeholders.join(", ")));
        }
        if !self.insights.is_empty() {
            let recent: Vec<&str> = self
                .insights
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|s| s.as_str())
                .collect();
            parts.push(format!("Key insights:\n- {}", recent.join("\n- ")));
        }
        if !self.decisions.is_empty() {
            let recent: Vec<&str> = self
                .decisions
                .iter()
                .rev()
                .take(3)
                .rev()
                .map(|s| s.as_str())
                .collect();
            parts.push(format!("Decisions so far:\n- {}", recent.join("\n- ")));
        }

        parts.join("\n\n")
    }
}

/// Bounded in-memory store of conversation contexts.
pub struct ContextManager {
    config: ContextConfig,
    contexts: Mutex<HashMap<String, ConversationContext>>,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Create a context, detecting stakeholders from the initial description.
    pub fn create_context(&self, task_type: TaskType, description: &str) -> String {
        let mut context = ConversationContext::new(task_type);
        context.stakeholders = detect_stakeholders(description);

        let id = context.id.clone();
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.insert(id.clone(), context);
            if contexts.len() > self.config.max_contexts {
                trim_oldest(&mut contexts, self.config.max_contexts);
            }
        }

        debug!(context_id = %id, task_type = %task_type, "Context created");
        id
    }

    /// Fetch a clone of a context.
    pub fn get(&self, context_id: &str) -> OrchResult<ConversationContext> {
        self.contexts
            .lock()
            .ok()
            .and_then(|contexts| contexts.get(context_id).cloned())
            .ok_or_else(|| OrchestrationError::ContextNotFound {
                context_id: context_id.to_string(),
            })
    }

    /// Append a message, detecting new stakeholders along the way.
    pub fn append_message(
        &self,
        context_id: &str,
        role: &str,
        content: &str,
    ) -> OrchResult<()> {
        self.update(context_id, |context, config| {
            for stakeholder in detect_stakeholders(content) {
                if !context.stakeholders.contains(&stakeholder) {
                    context.stakeholders.push(stakeholder);
                }
            }
            context.messages.push(ContextMessage {
                role: role.to_string(),
                content: content.to_string(),
                at: Utc::now(),
            });
            while context.messages.len() > config.max_messages {
                context.messages.remove(0);
            }
        })
    }

    pub fn add_insight(&self, context_id: &str, insight: &str) -> OrchResult<()> {
        self.update(context_id, |context, config| {
            context.insights.push(insight.to_string());
            while context.insights.len() > config.max_insights {
                context.insights.remove(0);
            }
        })
    }

    pub fn add_decision(&self, context_id: &str, decision: &str) -> OrchResult<()> {
        self.update(context_id, |context, config| {
            context.decisions.push(decision.to_string());
            while context.decisions.len() > config.max_decisions {
                context.decisions.remove(0);
            }
        })
    }

    /// Record where the current task stands.
    pub fn set_progress(
        &self,
        context_id: &str,
        stage: &str,
        percent: u8,
        activity: &str,
    ) -> OrchResult<()> {
        self.update(context_id, |context, _| {
            context.progress = ContextProgress {
                stage: stage.to_string(),
                percent: percent.min(100),
                activity: activity.to_string(),
            };
        })
    }

    /// Record the final result and mark the context terminal.
    pub fn set_final_result(&self, context_id: &str, result: &str) -> OrchResult<()> {
        self.update(context_id, |context, _| {
            context.final_result = Some(result.to_string());
            context.terminal = true;
        })
    }

    /// Drop terminal contexts past the age limit and trim the store to its
    /// cap. Returns how many contexts were removed.
    pub fn cleanup(&self) -> usize {
        let Ok(mut contexts) = self.contexts.lock() else {
            return 0;
        };
        let before = contexts.len();
        let max_age = Duration::milliseconds(self.config.max_context_age_ms as i64);
        let now = Utc::now();

        contexts.retain(|_, c| !(c.terminal && now - c.updated_at > max_age));

        if contexts.len() > self.config.max_contexts {
            trim_oldest(&mut contexts, self.config.max_contexts);
        }

        let removed = before - contexts.len();
        if removed > 0 {
            info!(removed, remaining = contexts.len(), "Context cleanup pass");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, context_id: &str, f: F) -> OrchResult<()>
    where
        F: FnOnce(&mut ConversationContext, &ContextConfig),
    {
        let mut contexts = self
            .contexts
            .lock()
            .map_err(|_| OrchestrationError::ContextNotFound {
                context_id: context_id.to_string(),
            })?;
        let context =
            contexts
                .get_mut(context_id)
                .ok_or_else(|| OrchestrationError::ContextNotFound {
                    context_id: context_id.to_string(),
                })?;
        f(context, &self.config);
        context.updated_at = Utc::now();
        Ok(())
    }
}

/// Find stakeholder keywords present in a text.
fn detect_stakeholders(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    STAKEHOLDER_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .map(|k| k.to_string())
        .collect()
}

fn trim_oldest(contexts: &mut HashMap<String, ConversationContext>, cap: usize) {
    let excess = contexts.len().saturating_sub(cap);
    if excess == 0 {
        return;
    }

    // Prefer evicting non-terminal only when terminal ones are newer
    let mut by_age: Vec<(String, DateTime<Utc>)> = contexts
        .iter()
        .map(|(id, c)| (id.clone(), c.updated_at))
        .collect();
    by_age.sort_by_key(|(_, at)| *at);

    for (id, _) in by_age.into_iter().take(excess) {
        contexts.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn manager() -> ContextManager {
        ContextManager::new(Config::default().context)
    }

    #[test]
    fn test_create_and_get() {
        let manager = manager();
        let id = manager.create_context(TaskType::DamageAssessment, "flood damage");
        let context = manager.get(&id).unwrap();
        assert_eq!(context.task_type, TaskType::DamageAssessment);
        assert!(!context.terminal);
    }

    #[test]
    fn test_get_unknown_context_errors() {
        let manager = manager();
        assert!(matches!(
            manager.get("missing"),
            Err(OrchestrationError::ContextNotFound { .. })
        ));
    }

    #[test]
    fn test_stakeholder_detection() {
        let manager = manager();
        let id = manager.create_context(
            TaskType::InsuranceClaim,
            "The homeowner is disputing the insurance assessment with the contractor",
        );
        let context = manager.get(&id).unwrap();
        assert!(context.stakeholders.contains(&"homeowner".to_string()));
        assert!(context.stakeholders.contains(&"insurance".to_string()));
        assert!(context.stakeholders.contains(&"contractor".to_string()));
        assert_eq!(context.stakeholders.len(), 3);
    }

    #[test]
    fn test_messages_are_bounded_fifo() {
        let manager = manager();
        let id = manager.create_context(TaskType::General, "test");

        for i in 0..60 {
            manager
                .append_message(&id, "user", &format!("message {}", i))
                .unwrap();
        }

        let context = manager.get(&id).unwrap();
        assert_eq!(context.messages.len(), 50);
        assert_eq!(context.messages[0].content, "message 10");
        assert_eq!(context.messages[49].content, "message 59");
    }

    #[test]
    fn test_insights_and_decisions_bounded() {
        let manager = manager();
        let id = manager.create_context(TaskType::General, "test");

        for i in 0..25 {
            manager.add_insight(&id, &format!("insight {}", i)).unwrap();
        }
        for i in 0..15 {
            manager.add_decision(&id, &format!("decision {}", i)).unwrap();
        }

        let context = manager.get(&id).unwrap();
        assert_eq!(context.insights.len(), 20);
        assert_eq!(context.decisions.len(), 10);
        assert_eq!(context.insights[0], "insight 5");
        assert_eq!(context.decisions[0], "decision 5");
    }

    #[test]
    fn test_progress_updates_and_clamps() {
        let manager = manager();
        let id = manager.create_context(TaskType::General, "test");

        manager
            .set_progress(&id, "executing", 40, "sequential-thinking")
            .unwrap();
        let context = manager.get(&id).unwrap();
        assert_eq!(context.progress.stage, "executing");
        assert_eq!(context.progress.percent, 40);
        assert_eq!(context.progress.activity, "sequential-thinking");

        manager.set_progress(&id, "completed", 150, "done").unwrap();
        assert_eq!(manager.get(&id).unwrap().progress.percent, 100);

        assert!(manager.set_progress("missing", "routing", 0, "x").is_err());
    }

    #[test]
    fn test_final_result_marks_terminal() {
        let manager = manager();
        let id = manager.create_context(TaskType::General, "test");
        manager.set_final_result(&id, "done").unwrap();

        let context = manager.get(&id).unwrap();
        assert!(context.terminal);
        assert_eq!(context.final_result.as_deref(), Some("done"));
    }

    #[test]
    fn test_cleanup_removes_old_terminal_contexts() {
        let mut config = Config::default().context;
        config.max_context_age_ms = 0;
        let manager = ContextManager::new(config);

        let terminal_id = manager.create_context(TaskType::General, "old finished work");
        manager.set_final_result(&terminal_id, "done").unwrap();
        let active_id = manager.create_context(TaskType::General, "still going");

        let removed = manager.cleanup();
        assert_eq!(removed, 1);
        assert!(manager.get(&terminal_id).is_err());
        assert!(manager.get(&active_id).is_ok());
    }

    #[test]
    fn test_store_trims_past_cap() {
        let mut config = Config::default().context;
        config.max_contexts = 5;
        let manager = ContextManager::new(config);

        for i in 0..8 {
            manager.create_context(TaskType::General, &format!("task {}", i));
        }
        assert!(manager.len() <= 5);
    }

    #[test]
    fn test_summary_for_prompt() {
        let manager = manager();
        let id = manager.create_context(TaskType::General, "the tenant reported damage");
        manager.add_insight(&id, "water entered under the door").unwrap();
        manager.add_decision(&id, "engage a plumber").unwrap();

        let summary = manager.get(&id).unwrap().summary_for_prompt();
        assert!(summary.contains("tenant"));
        assert!(summary.contains("water entered under the door"));
        assert!(summary.contains("engage a plumber"));
    }

    #[test]
    fn test_empty_summary() {
        let manager = manager();
        let id = manager.create_context(TaskType::General, "nothing notable");
        assert_eq!(manager.get(&id).unwrap().summary_for_prompt(), "");
    }
}

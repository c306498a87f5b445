//! Centralized prompt templates and builders.
//!
//! Keeping prompts in one module keeps the section contract between prompt
//! and parser in a single place: each builder's required output format must
//! match the headers the parser looks for.

use crate::agents::AgentPersona;
use crate::parser::ParsedStep;
use crate::types::TaskRequest;

/// Output format required of every sequential step response
const SEQUENTIAL_STEP_FORMAT: &str = "\
Respond in exactly this format:
REASONING: <your reasoning for this step>
CONCLUSION: <what this step established>
CONFIDENCE: <0.0-1.0>
NEXT_STEPS:
- <remaining work, one per line, or 'none'>
DEPENDENCIES:
- <information you still need, or 'none'>
COMPLETION_STATUS: <complete or incomplete>";

/// Build the system prompt for a sequential analysis chain.
///
/// The primary specialist leads the chain; consultants shape which angles
/// each step must cover without turning the chain into a group discussion.
pub fn sequential_system_prompt(primary: AgentPersona, consultants: &[AgentPersona]) -> String {
    let mut prompt = format!(
        "You are the {}, the primary analyst on an Australian disaster-recovery \
case, working step by step through a complex assessment. Specializations: {}. \
Each response covers exactly one reasoning step. Build on the previous steps, \
state what you concluded, and name what still needs doing.",
        primary.name(),
        primary.specializations().join(", "),
    );

    if !consultants.is_empty() {
        let angles: Vec<String> = consultants
            .iter()
            .map(|c| format!("{} ({})", c.name(), c.specializations().join(", ")))
            .collect();
        prompt.push_str(&format!(
            "\n\nCover the concerns these consulting specialists would raise: {}.",
            angles.join("; ")
        ));
    }

    prompt.push_str("\n\n");
    prompt.push_str(SEQUENTIAL_STEP_FORMAT);
    prompt
}

/// System prompt for one-shot single-agent analysis
pub const SINGLE_AGENT_SYSTEM_PROMPT: &str = "\
You are an experienced Australian disaster-recovery analyst. Give a direct, \
actionable assessment of the task. Be concise and concrete: what happened, \
what to do first, who to involve. End with a line 'CONFIDENCE: <0.0-1.0>'.";

/// Terse variant used on the emergency path
pub const EMERGENCY_SYSTEM_PROMPT: &str = "\
You are an emergency response coordinator. Life safety first. Answer in at \
most five short sentences: immediate danger, immediate action, who to call. \
End with 'CONFIDENCE: <0.0-1.0>'.";

/// Required output format appended to every discussion-round prompt
pub const AGENT_RESPONSE_FORMAT: &str = "\
Respond in exactly this format:
ANALYSIS: <your assessment from your specialty's viewpoint>
REASONING: <why you assess it that way>
RECOMMENDATIONS:
- <concrete recommendation, one per line>
CONFIDENCE: <0.0-1.0>
DISAGREEMENTS:
- <points where you disagree with other participants, or 'none'>
QUESTIONS:
- <open questions for the group, or 'none'>";

/// Build the user prompt for one sequential step.
pub fn sequential_step_prompt(
    request: &TaskRequest,
    context_summary: Option<&str>,
    previous_steps: &[ParsedStep],
    step_number: u32,
    simplified: bool,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Task ({}, priority {}): {}\n",
        request.task_type, request.priority, request.description
    ));

    if let Some(summary) = context_summary {
        if !summary.is_empty() {
            prompt.push_str(&format!("\nConversation context:\n{}\n", summary));
        }
    }

    if previous_steps.is_empty() {
        prompt.push_str("\nThis is step 1. Begin the analysis.\n");
    } else {
        prompt.push_str("\nPrevious steps:\n");
        for (i, step) in previous_steps.iter().enumerate() {
            prompt.push_str(&format!("Step {}: {}\n", i + 1, step.conclusion));
        }
        prompt.push_str(&format!("\nNow produce step {}.\n", step_number));
    }

    if simplified {
        prompt.push_str("\nKeep this step brief: two or three sentences of reasoning at most.\n");
    }

    prompt
}

/// Build the user prompt for one agent's turn in a discussion round.
pub fn agent_round_prompt(
    request: &TaskRequest,
    context_summary: Option<&str>,
    round: u32,
    other_positions: &[(String, String)],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Task ({}, priority {}): {}\n",
        request.task_type, request.priority, request.description
    ));

    if let Some(summary) = context_summary {
        if !summary.is_empty() {
            prompt.push_str(&format!("\nConversation context:\n{}\n", summary));
        }
    }

    if round == 1 {
        prompt.push_str("\nThis is round 1. Give your initial position.\n");
    } else {
        prompt.push_str(&format!(
            "\nRound {}. Positions from the previous round:\n",
            round
        ));
        for (name, position) in other_positions {
            prompt.push_str(&format!("{}: {}\n", name, position));
        }
        prompt.push_str(
            "\nRefine your position. Move toward agreement where the arguments warrant it.\n",
        );
    }

    prompt.push('\n');
    prompt.push_str(AGENT_RESPONSE_FORMAT);
    prompt
}

/// Build the moderator prompt for a breakthrough round after a stall.
pub fn breakthrough_prompt(
    request: &TaskRequest,
    round: u32,
    other_positions: &[(String, String)],
) -> String {
    let mut prompt = agent_round_prompt(request, None, round, other_positions);
    prompt.push_str(
        "\n\nThe discussion has stalled. Challenge the group's shared assumptions: \
name the one assumption most likely to be wrong and restate your position \
without it.",
    );
    prompt
}

/// Build the prompt that consolidates an exhausted reasoning chain.
///
/// Used when the step budget runs out before the analysis declares itself
/// complete: the partial conclusions still have to become one answer.
pub fn chain_synthesis_prompt(request: &TaskRequest, conclusions: &[String]) -> String {
    let mut prompt = format!(
        "Task ({}, priority {}): {}\n\nThe step budget is exhausted. Synthesize \
the step conclusions below into one final answer. Note explicitly what the \
analysis did not get to.\n\nStep conclusions:\n",
        request.task_type, request.priority, request.description
    );
    for (i, conclusion) in conclusions.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, conclusion));
    }
    prompt.push_str("\nEnd with a line 'CONFIDENCE: <0.0-1.0>'.");
    prompt
}

/// Build the moderator's synthesis prompt closing a discussion.
pub fn synthesis_prompt(
    request: &TaskRequest,
    positions: &[(String, f64, String)],
    consensus_reached: bool,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Task ({}): {}\n\nFinal positions (participant, trust, position):\n",
        request.task_type, request.description
    ));
    for (name, trust, position) in positions {
        prompt.push_str(&format!("{} (trust {:.2}): {}\n", name, trust, position));
    }

    if consensus_reached {
        prompt.push_str(
            "\nSynthesize the group's consensus into one final answer, weighting \
positions by trust.\n",
        );
    } else {
        prompt.push_str(
            "\nThe group did not reach consensus. Synthesize the strongest combined \
answer, weighting positions by trust, and state the unresolved disagreement \
explicitly.\n",
        );
    }

    prompt.push_str("End with a line 'CONFIDENCE: <0.0-1.0>'.");
    prompt
}

/// Build the prompt for a one-shot single-agent analysis.
pub fn single_agent_prompt(request: &TaskRequest, context_summary: Option<&str>) -> String {
    let mut prompt = format!(
        "Task ({}, priority {}): {}",
        request.task_type, request.priority, request.description
    );
    if let Some(summary) = context_summary {
        if !summary.is_empty() {
            prompt.push_str(&format!("\n\nConversation context:\n{}", summary));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskPriority, TaskType};

    fn request() -> TaskRequest {
        TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage")
            .with_priority(TaskPriority::High)
    }

    #[test]
    fn test_first_step_prompt() {
        let prompt = sequential_step_prompt(&request(), None, &[], 1, false);
        assert!(prompt.contains("damage-assessment"));
        assert!(prompt.contains("step 1"));
        assert!(!prompt.contains("Previous steps"));
    }

    #[test]
    fn test_later_step_includes_history() {
        let prev = ParsedStep {
            reasoning: "r".to_string(),
            conclusion: "Water entered via the back door".to_string(),
            confidence: 0.8,
            next_steps: vec![],
            dependencies: vec![],
            complete: false,
        };
        let prompt = sequential_step_prompt(&request(), None, &[prev], 2, false);
        assert!(prompt.contains("Water entered via the back door"));
        assert!(prompt.contains("step 2"));
    }

    #[test]
    fn test_agent_prompt_round_one_has_format() {
        let prompt = agent_round_prompt(&request(), None, 1, &[]);
        assert!(prompt.contains("round 1"));
        assert!(prompt.contains("ANALYSIS:"));
        assert!(prompt.contains("DISAGREEMENTS:"));
    }

    #[test]
    fn test_agent_prompt_later_round_shows_positions() {
        let positions = vec![("Safety Inspector".to_string(), "Evacuate first".to_string())];
        let prompt = agent_round_prompt(&request(), None, 2, &positions);
        assert!(prompt.contains("Safety Inspector: Evacuate first"));
    }

    #[test]
    fn test_synthesis_prompt_marks_missing_consensus() {
        let positions = vec![("Lead".to_string(), 0.95, "Replace the floor".to_string())];
        let prompt = synthesis_prompt(&request(), &positions, false);
        assert!(prompt.contains("did not reach consensus"));
        let prompt = synthesis_prompt(&request(), &positions, true);
        assert!(!prompt.contains("did not reach consensus"));
    }

    #[test]
    fn test_sequential_system_prompt_names_team() {
        use crate::agents::AgentPersona;

        let prompt = sequential_system_prompt(
            AgentPersona::TechnicalExpert,
            &[AgentPersona::SafetyInspector, AgentPersona::CostAnalyst],
        );
        assert!(prompt.contains("Technical Expert"));
        assert!(prompt.contains("Safety Inspector"));
        assert!(prompt.contains("Cost Analyst"));
        assert!(prompt.contains("step by step"));
        assert!(prompt.contains("COMPLETION_STATUS:"));

        let solo = sequential_system_prompt(AgentPersona::TechnicalExpert, &[]);
        assert!(!solo.contains("consulting specialists"));
    }

    #[test]
    fn test_chain_synthesis_prompt_lists_conclusions() {
        let conclusions = vec![
            "Water entered via the back door".to_string(),
            "Subfloor is saturated".to_string(),
        ];
        let prompt = chain_synthesis_prompt(&request(), &conclusions);
        assert!(prompt.contains("Synthesize"));
        assert!(prompt.contains("1. Water entered via the back door"));
        assert!(prompt.contains("2. Subfloor is saturated"));
        assert!(prompt.contains("CONFIDENCE:"));
    }
}

//! Multi-agent discussion.
//!
//! A panel of personas debates the task over rounds; every turn in a round
//! runs as its own concurrent model call, and a round survives partial
//! failure as long as a quorum responds. Convergence blends how similar the
//! panel's positions read (word-set Jaccard) with how confident the panel
//! is. A stalled discussion gets one breakthrough round; if that fails to
//! move the group the run errors out as deadlocked so the caller can fall
//! back to a cheaper strategy. On success the moderator synthesizes the
//! high-confidence positions, weighted by trust scores.

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::EngineCore;
use crate::agents::{moderator, select_participants, AgentPersona};
use crate::config::DiscussionConfig;
use crate::error::{OrchResult, OrchestrationError};
use crate::events::OrchestrationEvent;
use crate::invoker::{InvokeOptions, ModelMessage};
use crate::parser::{extract_confidence, parse_agent_turn, ParsedAgentTurn};
use crate::prompts::{agent_round_prompt, breakthrough_prompt, synthesis_prompt};
use crate::similarity::{containment, jaccard};
use crate::types::{Provider, TaskRequest};

/// Weight of position similarity in the convergence score
const SIMILARITY_WEIGHT: f64 = 0.7;
/// Weight of average confidence in the convergence score
const CONFIDENCE_WEIGHT: f64 = 0.3;
/// Improvement below this across two consecutive rounds counts as a stall
const STALL_IMPROVEMENT: f64 = 0.1;
/// A breakthrough round must beat the previous convergence by this much
const BREAKTHROUGH_MARGIN: f64 = 0.15;
/// Minimum responses for a round to count, capped by panel size
const ROUND_QUORUM: usize = 2;
/// Contributions at or above this confidence feed the consensus synthesis
const HIGH_CONFIDENCE_POSITION: f64 = 0.7;
/// Unresolved questions carried per round
const MAX_OPEN_QUESTIONS: usize = 3;
/// New insights carried per round
const MAX_ROUND_INSIGHTS: usize = 5;
/// A recommendation mostly covered by earlier text is not a new insight
const INSIGHT_COVERED_FRACTION: f64 = 0.6;
const LIMITED_PARTICIPANTS: usize = 2;
const LIMITED_ROUNDS: u32 = 2;

/// Parameters for a discussion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionParams {
    pub max_rounds: u32,
    pub convergence_threshold: f64,
    pub max_participants: usize,
    pub require_unanimous: bool,
    /// Force every turn onto one provider, used on the fallback path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_provider: Option<Provider>,
}

impl DiscussionParams {
    pub fn from_config(config: &DiscussionConfig) -> Self {
        Self {
            max_rounds: config.max_rounds.clamp(1, 10),
            convergence_threshold: config.convergence_threshold.clamp(0.0, 1.0),
            max_participants: config.max_participants.clamp(1, 5),
            require_unanimous: config.require_unanimous,
            forced_provider: None,
        }
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.clamp(1, 10);
        self
    }

    pub fn with_forced_provider(mut self, provider: Provider) -> Self {
        self.forced_provider = Some(provider);
        self
    }

    /// Fallback variant: two participants, two rounds.
    pub fn limited(mut self) -> Self {
        self.max_participants = self.max_participants.min(LIMITED_PARTICIPANTS);
        self.max_rounds = self.max_rounds.min(LIMITED_ROUNDS);
        self
    }
}

/// One persona's contribution in one round
#[derive(Debug, Clone)]
pub struct AgentContribution {
    pub persona: AgentPersona,
    pub round: u32,
    pub turn: ParsedAgentTurn,
}

impl AgentContribution {
    /// The text that represents this agent's position for convergence scoring.
    fn position_text(&self) -> String {
        if self.turn.recommendations.is_empty() {
            self.turn.analysis.clone()
        } else {
            self.turn.recommendations.join(" ")
        }
    }
}

/// One completed discussion round with its derived outputs
#[derive(Debug, Clone)]
pub struct DiscussionRound {
    pub number: u32,
    pub contributions: Vec<AgentContribution>,
    pub convergence: f64,
    /// One-line digest of where each participant stands
    pub summary: String,
    /// Questions the panel raised and nobody answered
    pub open_questions: Vec<String>,
    /// Recommendations not already covered by earlier rounds
    pub insights: Vec<String>,
}

/// Result of a discussion run
#[derive(Debug, Clone)]
pub struct DiscussionOutcome {
    pub rounds: Vec<DiscussionRound>,
    pub consensus: String,
    pub confidence: f64,
    pub convergence: f64,
    /// The panel crossed the convergence threshold before running out of rounds
    pub converged: bool,
    /// Unresolved disagreements from the final round
    pub dissent: Vec<String>,
    pub tokens_used: u64,
    pub provider: Provider,
}

/// Panel discussion engine
pub struct DiscussionEngine {
    core: EngineCore,
}

impl DiscussionEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    /// Run the discussion for a task.
    pub async fn run(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        params: DiscussionParams,
    ) -> OrchResult<DiscussionOutcome> {
        let participants = select_participants(
            request.task_type,
            request.required_accuracy,
            params.max_participants,
        );
        let lead = moderator(&participants).ok_or_else(|| OrchestrationError::StrategyFailed {
            message: "no participants selected".to_string(),
        })?;

        let mut rounds: Vec<DiscussionRound> = Vec::new();
        let mut tokens_used = 0_u64;
        let mut convergence = 0.0;
        let mut prev_convergence: Option<f64> = None;
        let mut stalled_rounds = 0_u32;
        let mut breakthrough_attempted = false;
        let mut converged = false;

        let mut round = 1;
        while round <= params.max_rounds {
            let breakthrough = stalled_rounds >= 2 && !breakthrough_attempted;
            if breakthrough {
                warn!(
                    task_id = %request.id,
                    round,
                    convergence,
                    "Discussion stalled, running breakthrough round"
                );
                breakthrough_attempted = true;
            }

            let (contributions, round_tokens) = self
                .run_round(
                    request,
                    context_summary,
                    &participants,
                    &rounds,
                    round,
                    breakthrough,
                    &params,
                )
                .await?;
            tokens_used += round_tokens;

            let new_convergence = convergence_score(&contributions);
            debug!(
                task_id = %request.id,
                round,
                convergence = new_convergence,
                "Discussion round scored"
            );

            if breakthrough {
                // A breakthrough that fails to move the group means deadlock
                if new_convergence <= convergence + BREAKTHROUGH_MARGIN {
                    return Err(OrchestrationError::DiscussionDeadlocked {
                        rounds: rounds.len() as u32 + 1,
                        convergence: new_convergence.max(convergence),
                    });
                }
                stalled_rounds = 0;
            } else if let Some(prev) = prev_convergence {
                if new_convergence - prev < STALL_IMPROVEMENT {
                    stalled_rounds += 1;
                } else {
                    stalled_rounds = 0;
                }
            }

            prev_convergence = Some(new_convergence);
            convergence = new_convergence;
            rounds.push(summarize_round(round, contributions, convergence, &rounds));

            self.core.events().emit(OrchestrationEvent::ProgressUpdate {
                task_id: request.id.clone(),
                stage: "multi-agent-discussion".to_string(),
                percent: ((round * 100) / params.max_rounds).min(100) as u8,
            });

            if self.has_converged(&rounds, convergence, &params) {
                converged = true;
                self.core.events().emit(OrchestrationEvent::ConsensusReached {
                    task_id: request.id.clone(),
                    rounds: rounds.len() as u32,
                    convergence,
                });
                break;
            }

            round += 1;
        }

        let final_round = rounds.last().ok_or_else(|| {
            OrchestrationError::StrategyFailed {
                message: "discussion produced no rounds".to_string(),
            }
        })?;

        let dissent: Vec<String> = final_round
            .contributions
            .iter()
            .flat_map(|c| c.turn.disagreements.iter().cloned())
            .collect();

        // Consensus draws on every high-confidence position across the whole
        // discussion; without consensus only the final round is trustworthy.
        let positions: Vec<&AgentContribution> = if converged {
            let high: Vec<&AgentContribution> = rounds
                .iter()
                .flat_map(|r| r.contributions.iter())
                .filter(|c| c.turn.confidence >= HIGH_CONFIDENCE_POSITION)
                .collect();
            if high.is_empty() {
                final_round.contributions.iter().collect()
            } else {
                high
            }
        } else {
            final_round.contributions.iter().collect()
        };

        let avg_confidence = average_confidence(&final_round.contributions);

        let (consensus, consensus_confidence, synthesis_tokens, provider) = self
            .synthesize(request, lead, &positions, converged, &params)
            .await?;
        tokens_used += synthesis_tokens;

        let confidence = consensus_confidence.unwrap_or(avg_confidence).clamp(0.0, 1.0);

        info!(
            task_id = %request.id,
            rounds = rounds.len(),
            convergence,
            converged,
            confidence,
            "Discussion completed"
        );

        Ok(DiscussionOutcome {
            rounds,
            consensus,
            confidence,
            convergence,
            converged,
            dissent,
            tokens_used,
            provider,
        })
    }

    /// Run one round with every participant's turn in flight concurrently.
    ///
    /// The round tolerates individual turn failures as long as a quorum of
    /// participants responds; contributions keep panel order regardless of
    /// completion order.
    #[allow(clippy::too_many_arguments)]
    async fn run_round(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        participants: &[AgentPersona],
        rounds: &[DiscussionRound],
        round: u32,
        breakthrough: bool,
        params: &DiscussionParams,
    ) -> OrchResult<(Vec<AgentContribution>, u64)> {
        let previous_positions: Vec<(String, String)> = rounds
            .last()
            .map(|r| {
                r.contributions
                    .iter()
                    .map(|c| (c.persona.name().to_string(), c.position_text()))
                    .collect()
            })
            .unwrap_or_default();

        let mut calls = JoinSet::new();
        for (index, persona) in participants.iter().copied().enumerate() {
            let others: Vec<(String, String)> = previous_positions
                .iter()
                .filter(|(name, _)| name != persona.name())
                .cloned()
                .collect();

            let prompt = if breakthrough {
                breakthrough_prompt(request, round, &others)
            } else {
                agent_round_prompt(request, context_summary, round, &others)
            };
            let messages = vec![
                ModelMessage::system(persona.system_prompt()),
                ModelMessage::user(prompt),
            ];
            let provider = params
                .forced_provider
                .unwrap_or_else(|| persona.preferred_provider());
            let options = InvokeOptions::default().with_provider(provider);

            let core = self.core.clone();
            calls.spawn(async move { (index, persona, core.invoke(messages, options).await) });
        }

        let mut indexed: Vec<(usize, AgentContribution)> = Vec::with_capacity(participants.len());
        let mut tokens = 0_u64;
        let mut last_error: Option<OrchestrationError> = None;

        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((index, persona, Ok(response))) => {
                    tokens += response.tokens_used;
                    let turn = parse_agent_turn(&response.content);
                    self.core.events().emit(OrchestrationEvent::AgentResponse {
                        task_id: request.id.clone(),
                        round,
                        agent: persona.name().to_string(),
                        confidence: turn.confidence,
                    });
                    indexed.push((index, AgentContribution { persona, round, turn }));
                }
                Ok((_, persona, Err(e))) => {
                    warn!(
                        task_id = %request.id,
                        round,
                        agent = persona.name(),
                        error = %e,
                        "Agent turn failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(OrchestrationError::StrategyFailed {
                        message: format!("agent turn task failed: {}", e),
                    });
                }
            }
        }

        indexed.sort_by_key(|(index, _)| *index);
        let contributions: Vec<AgentContribution> =
            indexed.into_iter().map(|(_, c)| c).collect();

        let quorum = participants.len().min(ROUND_QUORUM);
        if contributions.len() < quorum {
            return Err(last_error.unwrap_or(OrchestrationError::StrategyFailed {
                message: format!(
                    "round {}: {} of {} participants responded",
                    round,
                    contributions.len(),
                    participants.len()
                ),
            }));
        }

        Ok((contributions, tokens))
    }

    fn has_converged(
        &self,
        rounds: &[DiscussionRound],
        convergence: f64,
        params: &DiscussionParams,
    ) -> bool {
        if convergence < params.convergence_threshold {
            return false;
        }
        if params.require_unanimous {
            let Some(last) = rounds.last() else {
                return false;
            };
            return last
                .contributions
                .iter()
                .all(|c| c.turn.disagreements.is_empty());
        }
        true
    }

    async fn synthesize(
        &self,
        request: &TaskRequest,
        lead: AgentPersona,
        contributions: &[&AgentContribution],
        consensus_reached: bool,
        params: &DiscussionParams,
    ) -> OrchResult<(String, Option<f64>, u64, Provider)> {
        let positions: Vec<(String, f64, String)> = contributions
            .iter()
            .map(|c| {
                (
                    c.persona.name().to_string(),
                    c.persona.trust_score(),
                    c.position_text(),
                )
            })
            .collect();

        let messages = vec![
            ModelMessage::system(lead.system_prompt()),
            ModelMessage::user(synthesis_prompt(request, &positions, consensus_reached)),
        ];
        let provider = params
            .forced_provider
            .unwrap_or_else(|| lead.preferred_provider());
        let options = InvokeOptions::default().with_provider(provider);

        let response = self.core.invoke(messages, options).await?;
        let confidence = extract_confidence(&response.content);

        Ok((
            response.content,
            confidence,
            response.tokens_used,
            response.provider,
        ))
    }
}

/// Derive a round record: digest, unresolved questions, and new insights.
fn summarize_round(
    number: u32,
    contributions: Vec<AgentContribution>,
    convergence: f64,
    prior_rounds: &[DiscussionRound],
) -> DiscussionRound {
    let avg = average_confidence(&contributions);
    let stances: Vec<String> = contributions
        .iter()
        .map(|c| {
            let position = c
                .turn
                .recommendations
                .first()
                .cloned()
                .unwrap_or_else(|| c.turn.analysis.clone());
            format!("{}: {}", c.persona.name(), position)
        })
        .collect();
    let summary = format!(
        "Round {} (avg confidence {:.2}): {}",
        number,
        avg,
        stances.join("; ")
    );

    let mut open_questions: Vec<String> = Vec::new();
    for question in contributions.iter().flat_map(|c| c.turn.questions.iter()) {
        if open_questions.len() >= MAX_OPEN_QUESTIONS {
            break;
        }
        if !open_questions.iter().any(|q| q.eq_ignore_ascii_case(question)) {
            open_questions.push(question.clone());
        }
    }

    let prior_text = prior_rounds
        .iter()
        .flat_map(|r| r.contributions.iter())
        .map(|c| c.position_text())
        .collect::<Vec<_>>()
        .join(" ");

    let mut insights: Vec<String> = Vec::new();
    for rec in contributions.iter().flat_map(|c| c.turn.recommendations.iter()) {
        if insights.len() >= MAX_ROUND_INSIGHTS {
            break;
        }
        let already_known =
            !prior_text.is_empty() && containment(rec, &prior_text) >= INSIGHT_COVERED_FRACTION;
        let duplicate = insights
            .iter()
            .any(|i| containment(rec, i) >= INSIGHT_COVERED_FRACTION);
        if !already_known && !duplicate {
            insights.push(rec.clone());
        }
    }

    DiscussionRound {
        number,
        contributions,
        convergence,
        summary,
        open_questions,
        insights,
    }
}

/// Convergence of a round: blended position similarity and confidence.
pub fn convergence_score(contributions: &[AgentContribution]) -> f64 {
    if contributions.is_empty() {
        return 0.0;
    }

    let avg_confidence = average_confidence(contributions);

    let positions: Vec<String> = contributions.iter().map(|c| c.position_text()).collect();
    let similarity = if positions.len() < 2 {
        1.0
    } else {
        let mut total = 0.0;
        let mut pairs = 0;
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                total += jaccard(&positions[i], &positions[j]);
                pairs += 1;
            }
        }
        total / pairs as f64
    };

    (SIMILARITY_WEIGHT * similarity + CONFIDENCE_WEIGHT * avg_confidence).clamp(0.0, 1.0)
}

fn average_confidence(contributions: &[AgentContribution]) -> f64 {
    if contributions.is_empty() {
        return 0.0;
    }
    contributions.iter().map(|c| c.turn.confidence).sum::<f64>() / contributions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::invoker::{MockModelInvoker, ModelResponse};
    use crate::types::TaskType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn contribution(recommendations: &[&str], confidence: f64) -> AgentContribution {
        AgentContribution {
            persona: AgentPersona::TechnicalExpert,
            round: 1,
            turn: ParsedAgentTurn {
                analysis: String::new(),
                reasoning: String::new(),
                recommendations: recommendations.iter().map(|s| s.to_string()).collect(),
                confidence,
                disagreements: vec![],
                questions: vec![],
            },
        }
    }

    #[test]
    fn test_identical_positions_full_confidence_converge_fully() {
        let round = vec![
            contribution(&["replace the damaged flooring"], 1.0),
            contribution(&["replace the damaged flooring"], 1.0),
        ];
        assert!((convergence_score(&round) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_convergence_bounded_and_symmetric() {
        let a = contribution(&["dry the subfloor first"], 0.8);
        let b = contribution(&["replace wiring in the wall"], 0.6);

        let forward = convergence_score(&[a.clone(), b.clone()]);
        let backward = convergence_score(&[b, a]);
        assert_eq!(forward, backward);
        assert!((0.0..=1.0).contains(&forward));
    }

    #[test]
    fn test_disjoint_positions_score_confidence_only() {
        let round = vec![
            contribution(&["alpha beta"], 1.0),
            contribution(&["gamma delta"], 1.0),
        ];
        // Similarity 0, confidence 1.0: only the confidence weight remains
        assert!((convergence_score(&round) - CONFIDENCE_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn test_round_record_dedups_questions_and_insights() {
        let mut first = contribution(&["tarp the roof", "document all damage"], 0.8);
        first.turn.questions = vec![
            "Is the ceiling cavity wet?".to_string(),
            "is the ceiling cavity wet?".to_string(),
        ];
        let mut second = contribution(&["tarp the roof"], 0.7);
        second.turn.questions = vec![
            "Who holds the insurance policy?".to_string(),
            "What is the roof pitch?".to_string(),
            "Is asbestos present?".to_string(),
        ];

        let record = summarize_round(1, vec![first, second], 0.5, &[]);

        // Case-insensitive dedup, then capped
        assert_eq!(record.open_questions.len(), MAX_OPEN_QUESTIONS);
        assert_eq!(record.open_questions[0], "Is the ceiling cavity wet?");
        // The repeated recommendation collapses to one insight
        assert_eq!(
            record.insights,
            vec!["tarp the roof".to_string(), "document all damage".to_string()]
        );
        assert!(record.summary.contains("Round 1"));
        assert!(record.summary.contains("Technical Expert"));
    }

    #[test]
    fn test_round_record_drops_insights_covered_by_earlier_rounds() {
        let earlier = summarize_round(
            1,
            vec![contribution(&["tarp the roof before the next front"], 0.8)],
            0.5,
            &[],
        );
        let record = summarize_round(
            2,
            vec![contribution(
                &["tarp the roof", "engage a structural engineer"],
                0.8,
            )],
            0.6,
            &[earlier],
        );

        assert_eq!(record.insights, vec!["engage a structural engineer".to_string()]);
    }

    fn agent_response(recommendation: &str, confidence: f64) -> String {
        format!(
            "ANALYSIS: Looked at the site.\nREASONING: Standard case.\nRECOMMENDATIONS:\n- {}\nCONFIDENCE: {}\nDISAGREEMENTS: none\nQUESTIONS: none",
            recommendation, confidence
        )
    }

    fn request() -> TaskRequest {
        TaskRequest::new(TaskType::DamageAssessment, "Assess storm damage to the roof")
    }

    fn engine(mock: MockModelInvoker) -> DiscussionEngine {
        DiscussionEngine::new(EngineCore::new(Arc::new(mock), EventBus::new()))
    }

    fn params() -> DiscussionParams {
        DiscussionParams::from_config(&crate::config::Config::default().discussion)
    }

    #[tokio::test]
    async fn test_agreeing_panel_converges_in_one_round() {
        let mut mock = MockModelInvoker::new();
        let agent_text = agent_response("replace the roof sheeting", 0.9);
        mock.expect_generate().returning(move |messages, _| {
            let user = &messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let content = if user.contains("Final positions") {
                "Consensus: replace the roof sheeting.\nCONFIDENCE: 0.9".to_string()
            } else {
                agent_text.clone()
            };
            Ok(ModelResponse {
                content,
                confidence: None,
                provider: Provider::AnthropicClaude,
                tokens_used: 40,
                latency_ms: 10,
            })
        });

        let outcome = engine(mock).run(&request(), None, params()).await.unwrap();

        assert_eq!(outcome.rounds.len(), 1);
        assert!(outcome.converged);
        assert!(outcome.convergence >= 0.8);
        assert_eq!(outcome.confidence, 0.9);
        assert!(outcome.consensus.contains("replace the roof sheeting"));
        // Identical recommendations collapse to one round insight
        assert_eq!(outcome.rounds[0].insights.len(), 1);
    }

    #[tokio::test]
    async fn test_round_survives_one_failed_turn() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let agent_text = agent_response("replace the roof sheeting", 0.9);
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(move |messages, _| {
            let user = &messages.last().map(|m| m.content.clone()).unwrap_or_default();
            if user.contains("Final positions") {
                return Ok(ModelResponse {
                    content: "Consensus: replace the roof sheeting.\nCONFIDENCE: 0.9".to_string(),
                    confidence: None,
                    provider: Provider::AnthropicClaude,
                    tokens_used: 40,
                    latency_ms: 10,
                });
            }
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err(crate::error::InvokerError::Unavailable {
                    message: "provider down".to_string(),
                    retries: 3,
                });
            }
            Ok(ModelResponse {
                content: agent_text.clone(),
                confidence: None,
                provider: Provider::AnthropicClaude,
                tokens_used: 40,
                latency_ms: 10,
            })
        });

        let outcome = engine(mock).run(&request(), None, params()).await.unwrap();

        // Four-persona panel, one failed turn: the round still counts
        assert_eq!(outcome.rounds[0].contributions.len(), 3);
        assert!(outcome.converged);
    }

    #[tokio::test]
    async fn test_disagreeing_panel_runs_all_rounds() {
        let mut mock = MockModelInvoker::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        mock.expect_generate().returning(move |messages, _| {
            let user = &messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let content = if user.contains("Final positions") {
                "No consensus reached; strongest combined answer follows.\nCONFIDENCE: 0.5"
                    .to_string()
            } else {
                // Every agent recommends something different every time
                let n = counter_clone.fetch_add(1, Ordering::SeqCst);
                agent_response(&format!("unique position number {}", n * 7 + 1), 0.4)
            };
            Ok(ModelResponse {
                content,
                confidence: None,
                provider: Provider::OpenRouterGptOss120b,
                tokens_used: 40,
                latency_ms: 10,
            })
        });

        let outcome = engine(mock)
            .run(&request(), None, params().with_max_rounds(3))
            .await
            .unwrap();

        assert!(outcome.rounds.len() <= 3);
        assert!(!outcome.converged);
        assert!(outcome.convergence < 0.8);
    }

    #[tokio::test]
    async fn test_stalled_panel_deadlocks_with_error() {
        let mut mock = MockModelInvoker::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        mock.expect_generate().returning(move |_, _| {
            let n = counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(ModelResponse {
                content: agent_response(&format!("unique position number {}", n * 7 + 1), 0.3),
                confidence: None,
                provider: Provider::OpenRouterGptOss120b,
                tokens_used: 40,
                latency_ms: 10,
            })
        });

        let result = engine(mock)
            .run(&request(), None, params().with_max_rounds(6))
            .await;

        // Two stalled rounds trigger the breakthrough in round 4; it changes
        // nothing, so the run fails instead of pretending to succeed.
        match result {
            Err(OrchestrationError::DiscussionDeadlocked { rounds, .. }) => {
                assert_eq!(rounds, 4);
            }
            other => panic!("expected deadlock error, got {:?}", other.map(|o| o.consensus)),
        }
    }

    #[tokio::test]
    async fn test_failing_invoker_propagates_error() {
        let mut mock = MockModelInvoker::new();
        mock.expect_generate().returning(|_, _| {
            Err(crate::error::InvokerError::Unavailable {
                message: "down".to_string(),
                retries: 3,
            })
        });

        assert!(engine(mock).run(&request(), None, params()).await.is_err());
    }

    #[tokio::test]
    async fn test_discussion_emits_agent_and_consensus_events() {
        let mut mock = MockModelInvoker::new();
        let agent_text = agent_response("replace the roof sheeting", 0.9);
        mock.expect_generate().returning(move |messages, _| {
            let user = &messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let content = if user.contains("Final positions") {
                "Consensus: replace the roof sheeting.\nCONFIDENCE: 0.9".to_string()
            } else {
                agent_text.clone()
            };
            Ok(ModelResponse {
                content,
                confidence: None,
                provider: Provider::AnthropicClaude,
                tokens_used: 40,
                latency_ms: 10,
            })
        });

        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let engine = DiscussionEngine::new(EngineCore::new(Arc::new(mock), bus));
        engine.run(&request(), None, params()).await.unwrap();

        let mut agent_responses = 0;
        let mut saw_consensus = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                OrchestrationEvent::AgentResponse { round, .. } => {
                    assert_eq!(round, 1);
                    agent_responses += 1;
                }
                OrchestrationEvent::ConsensusReached { rounds, convergence, .. } => {
                    assert_eq!(rounds, 1);
                    assert!(convergence >= 0.8);
                    saw_consensus = true;
                }
                _ => {}
            }
        }
        // Damage-assessment panel seats four personas
        assert_eq!(agent_responses, 4);
        assert!(saw_consensus);
    }

    #[test]
    fn test_limited_params() {
        let params = params().limited();
        assert_eq!(params.max_participants, LIMITED_PARTICIPANTS);
        assert_eq!(params.max_rounds, LIMITED_ROUNDS);
    }
}

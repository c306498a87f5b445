//! Sequential thinking chain.
//!
//! Runs one model call per reasoning step, feeding prior conclusions forward.
//! The primary specialist for the task type leads the chain with the other
//! specialists framed as consultants. Chain confidence is a recency-weighted
//! average so late steps, which have seen the most context, count more. A
//! failed step may be retried once on the alternate provider with its
//! confidence discounted; an exhausted step budget gets a closing synthesis
//! call over the partial conclusions.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::EngineCore;
use crate::agents::analysis_team;
use crate::config::SequentialConfig;
use crate::error::{OrchResult, OrchestrationError};
use crate::events::OrchestrationEvent;
use crate::invoker::{InvokeOptions, ModelMessage};
use crate::parser::{parse_step, ParsedStep};
use crate::prompts::{chain_synthesis_prompt, sequential_step_prompt, sequential_system_prompt};
use crate::types::{Provider, TaskRequest};

/// Weight base for recency weighting: step i carries weight 1.2^i
const RECENCY_WEIGHT_BASE: f64 = 1.2;
/// Confidence multiplier applied to a step that needed recovery
const RECOVERY_DISCOUNT: f64 = 0.8;
/// Floor for a recovered step's confidence
const RECOVERY_FLOOR: f64 = 0.3;
/// A single step this confident with nothing left to do ends the chain
const EARLY_STOP_STEP_CONFIDENCE: f64 = 0.95;
/// Average of the last three steps that ends the chain when work is nearly done
const EARLY_STOP_WINDOW_CONFIDENCE: f64 = 0.9;
const SIMPLIFIED_MAX_STEPS: u32 = 3;

/// Parameters for a sequential thinking run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialParams {
    pub max_steps: u32,
    pub timeout_per_step_ms: u64,
    pub confidence_threshold: f64,
    pub enable_recovery: bool,
    /// Shorter prompts and a tighter step cap, used on the fallback path
    #[serde(default)]
    pub simplified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<Provider>,
}

impl SequentialParams {
    pub fn from_config(config: &SequentialConfig) -> Self {
        Self {
            max_steps: config.max_steps.clamp(1, 20),
            timeout_per_step_ms: config.timeout_per_step_ms,
            confidence_threshold: config.confidence_threshold,
            enable_recovery: config.enable_recovery,
            simplified: false,
            preferred_provider: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.clamp(1, 20);
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.preferred_provider = Some(provider);
        self
    }

    /// Fallback variant: capped steps, brief prompts.
    pub fn simplified(mut self) -> Self {
        self.simplified = true;
        self.max_steps = self.max_steps.min(SIMPLIFIED_MAX_STEPS);
        self
    }
}

/// One executed step of the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    pub number: u32,
    pub reasoning: String,
    pub conclusion: String,
    pub confidence: f64,
    pub next_steps: Vec<String>,
    pub dependencies: Vec<String>,
    pub provider: Provider,
    /// Step was re-run on the alternate provider after a failure
    pub recovered: bool,
}

/// Result of a sequential thinking run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub steps: Vec<ChainStep>,
    pub conclusion: String,
    pub total_confidence: f64,
    pub early_stopped: bool,
    pub tokens_used: u64,
    pub provider: Provider,
}

/// Step-by-step reasoning engine
pub struct SequentialEngine {
    core: EngineCore,
}

impl SequentialEngine {
    pub fn new(core: EngineCore) -> Self {
        Self { core }
    }

    /// Execute the chain for a task.
    pub async fn run(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        params: SequentialParams,
    ) -> OrchResult<ChainOutcome> {
        let (primary, consultants) = analysis_team(request.task_type, request.required_accuracy);
        let system = sequential_system_prompt(primary, &consultants);

        let mut steps: Vec<ChainStep> = Vec::new();
        let mut parsed_steps: Vec<ParsedStep> = Vec::new();
        let mut tokens_used = 0_u64;
        let mut early_stopped = false;
        let mut completed = false;
        let mut last_provider = params.preferred_provider.unwrap_or(Provider::fastest());

        for step_number in 1..=params.max_steps {
            let (parsed, provider, tokens, recovered) = self
                .execute_step(
                    request,
                    context_summary,
                    &system,
                    &parsed_steps,
                    step_number,
                    &params,
                )
                .await?;

            tokens_used += tokens;
            last_provider = provider;

            self.core.events().emit(OrchestrationEvent::ThinkingStep {
                task_id: request.id.clone(),
                step: step_number,
                confidence: parsed.confidence,
            });
            self.core.events().emit(OrchestrationEvent::ProgressUpdate {
                task_id: request.id.clone(),
                stage: "sequential-thinking".to_string(),
                percent: ((step_number * 100) / params.max_steps).min(100) as u8,
            });

            let step = ChainStep {
                number: step_number,
                reasoning: parsed.reasoning.clone(),
                conclusion: parsed.conclusion.clone(),
                confidence: parsed.confidence,
                next_steps: parsed.next_steps.clone(),
                dependencies: parsed.dependencies.clone(),
                provider,
                recovered,
            };
            // A step that claims completion below the confidence bar keeps
            // the chain going; the claim is not trustworthy yet.
            let complete = parsed.complete
                && parsed.next_steps.is_empty()
                && parsed.confidence >= params.confidence_threshold;
            steps.push(step);
            parsed_steps.push(parsed);

            if complete {
                completed = true;
                break;
            }
            if self.should_stop_early(&parsed_steps) {
                early_stopped = true;
                break;
            }
        }

        let total_confidence = chain_confidence(&steps);
        let mut conclusion = steps
            .iter()
            .rev()
            .find(|s| !s.conclusion.is_empty())
            .map(|s| s.conclusion.clone())
            .unwrap_or_else(|| {
                steps
                    .iter()
                    .map(|s| s.reasoning.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            });

        // Exhausted budget: the last step is not an answer, so consolidate
        // every partial conclusion into one.
        if !completed && !early_stopped {
            match self.synthesize_chain(request, &system, &steps, &params).await {
                Ok((text, tokens)) => {
                    tokens_used += tokens;
                    if !text.trim().is_empty() {
                        conclusion = text;
                    }
                }
                Err(e) => {
                    warn!(
                        task_id = %request.id,
                        error = %e,
                        "Chain synthesis failed, keeping final step conclusion"
                    );
                }
            }
        }

        if conclusion.is_empty() {
            return Err(OrchestrationError::StrategyFailed {
                message: "chain produced no usable conclusion".to_string(),
            });
        }

        info!(
            task_id = %request.id,
            steps = steps.len(),
            total_confidence,
            early_stopped,
            completed,
            "Sequential chain completed"
        );

        Ok(ChainOutcome {
            steps,
            conclusion,
            total_confidence,
            early_stopped,
            tokens_used,
            provider: last_provider,
        })
    }

    /// Consolidate an exhausted chain's partial conclusions into one answer.
    async fn synthesize_chain(
        &self,
        request: &TaskRequest,
        system: &str,
        steps: &[ChainStep],
        params: &SequentialParams,
    ) -> OrchResult<(String, u64)> {
        let conclusions: Vec<String> = steps
            .iter()
            .filter(|s| !s.conclusion.is_empty())
            .map(|s| s.conclusion.clone())
            .collect();
        if conclusions.is_empty() {
            return Err(OrchestrationError::StrategyFailed {
                message: "no step conclusions to synthesize".to_string(),
            });
        }

        let provider = params.preferred_provider.unwrap_or(Provider::fastest());
        let messages = vec![
            ModelMessage::system(system),
            ModelMessage::user(chain_synthesis_prompt(request, &conclusions)),
        ];
        let options = InvokeOptions::default()
            .with_provider(provider)
            .with_timeout_ms(params.timeout_per_step_ms);

        let response = self
            .core
            .invoke_with_deadline(messages, options, params.timeout_per_step_ms)
            .await?;
        Ok((response.content, response.tokens_used))
    }

    async fn execute_step(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        system: &str,
        previous: &[ParsedStep],
        step_number: u32,
        params: &SequentialParams,
    ) -> OrchResult<(ParsedStep, Provider, u64, bool)> {
        let provider = params.preferred_provider.unwrap_or(Provider::fastest());

        match self
            .call_step(request, context_summary, system, previous, step_number, params, provider)
            .await
        {
            Ok((parsed, tokens)) => Ok((parsed, provider, tokens, false)),
            Err(e) if params.enable_recovery => {
                let alternate = provider.alternate();
                warn!(
                    task_id = %request.id,
                    step = step_number,
                    error = %e,
                    alternate = %alternate,
                    "Step failed, attempting recovery on alternate provider"
                );

                let (mut parsed, tokens) = self
                    .call_step(
                        request,
                        context_summary,
                        system,
                        previous,
                        step_number,
                        params,
                        alternate,
                    )
                    .await?;
                parsed.confidence = (parsed.confidence * RECOVERY_DISCOUNT).max(RECOVERY_FLOOR);
                Ok((parsed, alternate, tokens, true))
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_step(
        &self,
        request: &TaskRequest,
        context_summary: Option<&str>,
        system: &str,
        previous: &[ParsedStep],
        step_number: u32,
        params: &SequentialParams,
        provider: Provider,
    ) -> OrchResult<(ParsedStep, u64)> {
        let prompt = sequential_step_prompt(
            request,
            context_summary,
            previous,
            step_number,
            params.simplified,
        );
        let messages = vec![
            ModelMessage::system(system),
            ModelMessage::user(prompt),
        ];
        let options = InvokeOptions::default()
            .with_provider(provider)
            .with_timeout_ms(params.timeout_per_step_ms);

        let response = self
            .core
            .invoke_with_deadline(messages, options, params.timeout_per_step_ms)
            .await?;

        Ok((parse_step(&response.content), response.tokens_used))
    }

    /// Early-stop rules: a near-certain step with nothing left, or a very
    /// confident recent window with at most one item remaining.
    fn should_stop_early(&self, steps: &[ParsedStep]) -> bool {
        let Some(last) = steps.last() else {
            return false;
        };

        if last.confidence >= EARLY_STOP_STEP_CONFIDENCE && last.next_steps.is_empty() {
            return true;
        }

        if steps.len() >= 3 {
            let recent = &steps[steps.len() - 3..];
            let avg = recent.iter().map(|s| s.confidence).sum::<f64>() / 3.0;
            if avg >= EARLY_STOP_WINDOW_CONFIDENCE && last.next_steps.len() <= 1 {
                return true;
            }
        }

        false
    }
}

/// Recency-weighted average confidence over the chain.
fn chain_confidence(steps: &[ChainStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (i, step) in steps.iter().enumerate() {
        let weight = RECENCY_WEIGHT_BASE.powi(i as i32);
        weighted_sum += step.confidence * weight;
        weight_total += weight;
    }
    (weighted_sum / weight_total).clamp(0.0, 1.0)
}

//! Orchestration service facade.
//!
//! Wires the router, strategy engines, fallback manager, similarity caches,
//! context store, and performance monitor behind one entry point. A call to
//! [`OrchestrationService::orchestrate`] always produces a usable answer:
//! strategy and provider failures degrade through the fallback chain rather
//! than surfacing as errors. Only invalid input and unknown context IDs are
//! reported as errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheContext, CacheStats, SimilarityCache};
use crate::config::Config;
use crate::context::ContextManager;
use crate::engines::{DiscussionEngine, EngineCore, SequentialEngine, SingleEngine};
use crate::error::{AppResult, OrchestrationError};
use crate::events::{EventBus, OrchestrationEvent};
use crate::fallback::{CircuitState, FallbackManager, FallbackStats};
use crate::invoker::ModelInvoker;
use crate::monitor::{PerformanceMonitor, PerformanceReport, SnapshotKind, TaskRecord, Totals};
use crate::routing::{IntelligentRouter, RoutingDecision};
use crate::types::{
    estimate_cost, Approach, Provider, TaskOutcome, TaskRequest, EMERGENCY_FALLBACK_LEVEL,
};

/// Cache partition names
const PARTITION_ANALYSIS: &str = "analysis-results";
const PARTITION_AGENT: &str = "agent-responses";
const PARTITION_DISCUSSION: &str = "discussion-outcomes";
const PARTITION_ROUTING: &str = "routing-decisions";

/// Routing decisions are only reused on near-identical tasks
const ROUTING_CACHE_THRESHOLD: f64 = 0.9;
/// Context store cleanup cadence
const CONTEXT_CLEANUP_INTERVAL_SECS: u64 = 600;

/// A completed answer stored in the similarity caches
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAnswer {
    result: String,
    confidence: f64,
    approach: Approach,
    provider: Option<Provider>,
    tokens_used: u64,
}

/// Point-in-time view of service health
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub started_at: DateTime<Utc>,
    pub active_contexts: usize,
    pub cache: HashMap<&'static str, CacheStats>,
    /// Circuit state per operation key (`approach_tasktype`)
    pub breakers: HashMap<String, CircuitState>,
    pub fallback: FallbackStats,
    pub overall: Totals,
}

/// Facade over the whole orchestration engine.
pub struct OrchestrationService {
    config: Config,
    router: IntelligentRouter,
    fallback: FallbackManager,
    contexts: ContextManager,
    monitor: PerformanceMonitor,
    events: EventBus,
    sequential_cache: SimilarityCache<CachedAnswer>,
    single_cache: SimilarityCache<CachedAnswer>,
    discussion_cache: SimilarityCache<CachedAnswer>,
    routing_cache: SimilarityCache<RoutingDecision>,
    maintenance: Mutex<Vec<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl OrchestrationService {
    pub fn new(config: Config, invoker: Arc<dyn ModelInvoker>) -> Self {
        let events = EventBus::new();
        let core = EngineCore::new(invoker, events.clone());
        let fallback = FallbackManager::new(
            SequentialEngine::new(core.clone()),
            DiscussionEngine::new(core.clone()),
            SingleEngine::new(core),
            config.clone(),
            events.clone(),
        );

        Self {
            router: IntelligentRouter::new(config.routing.clone()),
            fallback,
            contexts: ContextManager::new(config.context.clone()),
            monitor: PerformanceMonitor::new(config.monitoring.clone(), events.clone()),
            sequential_cache: SimilarityCache::new(PARTITION_ANALYSIS, config.cache.clone()),
            single_cache: SimilarityCache::new(PARTITION_AGENT, config.cache.clone()),
            discussion_cache: SimilarityCache::new(PARTITION_DISCUSSION, config.cache.clone()),
            routing_cache: SimilarityCache::new(PARTITION_ROUTING, config.cache.clone()),
            events,
            config,
            maintenance: Mutex::new(Vec::new()),
            started_at: Utc::now(),
        }
    }

    /// Run one task end to end.
    ///
    /// Errors only on invalid input or an unknown context ID. Strategy and
    /// provider failures degrade through the fallback chain, down to the
    /// terminal emergency template; the returned outcome is always a success.
    pub async fn orchestrate(&self, request: TaskRequest) -> AppResult<TaskOutcome> {
        validate(&request)?;
        let started = Instant::now();

        let context_id = match &request.context_id {
            Some(id) => {
                // An explicit context must exist
                self.contexts.get(id)?;
                id.clone()
            }
            None => self
                .contexts
                .create_context(request.task_type, &request.description),
        };
        if let Err(e) = self
            .contexts
            .append_message(&context_id, "user", &request.description)
        {
            warn!(context_id = %context_id, error = %e, "Failed to record user message");
        }
        self.set_progress(&context_id, "routing", 10, "selecting reasoning strategy");

        let cache_context = cache_context(&request);
        let decision = self.route_with_cache(&request, &cache_context);

        info!(
            task_id = %request.id,
            task_type = %request.task_type,
            approach = %decision.approach,
            complexity = decision.complexity,
            urgency = decision.urgency,
            "Orchestrating task"
        );

        if let Some(hit) = self.fetch_cached_answer(&request, &cache_context, decision.approach) {
            let duration_ms = started.elapsed().as_millis() as u64;
            self.finish_context(&context_id, &hit.result);
            self.monitor.record_task(TaskRecord {
                approach: hit.approach,
                provider: hit.provider,
                duration_ms,
                success: true,
                confidence: hit.confidence,
                tokens_used: 0,
                cost: 0.0,
                cache_hit: true,
            });
            self.events.emit(OrchestrationEvent::TaskCompleted {
                task_id: request.id.clone(),
                approach: hit.approach,
                confidence: hit.confidence,
                duration_ms,
            });

            return Ok(TaskOutcome {
                task_id: request.id,
                success: true,
                result: hit.result,
                confidence: hit.confidence,
                approach: hit.approach,
                provider: hit.provider,
                fallback_level: 0,
                tokens_used: 0,
                duration_ms,
                cache_hit: true,
                estimated_cost: 0.0,
                warnings: Vec::new(),
            });
        }

        self.events.emit(OrchestrationEvent::TaskStarted {
            task_id: request.id.clone(),
            approach: decision.approach,
        });

        let summary = self
            .contexts
            .get(&context_id)
            .map(|c| c.summary_for_prompt())
            .unwrap_or_default();
        let summary = (!summary.is_empty()).then_some(summary);

        self.set_progress(
            &context_id,
            "executing",
            40,
            &decision.approach.to_string(),
        );

        let execution = self
            .fallback
            .execute(&request, summary.as_deref(), decision.approach)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let estimated_cost = estimate_cost(execution.approach, execution.fallback_level);
        let degraded_to_template = execution.fallback_level == EMERGENCY_FALLBACK_LEVEL;

        self.router
            .record_outcome(decision.approach, execution.fallback_level == 0);

        if !degraded_to_template {
            self.store_answer(&request, &cache_context, &decision, &execution);
        }

        self.record_context_outcome(&context_id, &decision, &execution);
        self.finish_context(&context_id, &execution.result);
        self.monitor.record_task(TaskRecord {
            approach: execution.approach,
            provider: execution.provider,
            duration_ms,
            success: !degraded_to_template,
            confidence: execution.confidence,
            tokens_used: execution.tokens_used,
            cost: estimated_cost,
            cache_hit: false,
        });
        self.events.emit(OrchestrationEvent::TaskCompleted {
            task_id: request.id.clone(),
            approach: execution.approach,
            confidence: execution.confidence,
            duration_ms,
        });

        Ok(TaskOutcome {
            task_id: request.id,
            success: true,
            result: execution.result,
            confidence: execution.confidence,
            approach: execution.approach,
            provider: execution.provider,
            fallback_level: execution.fallback_level,
            tokens_used: execution.tokens_used,
            duration_ms,
            cache_hit: false,
            estimated_cost,
            warnings: execution.warnings,
        })
    }

    /// Route the task, reusing a cached decision for near-identical tasks.
    fn route_with_cache(
        &self,
        request: &TaskRequest,
        cache_context: &CacheContext,
    ) -> RoutingDecision {
        if let Some(cached) = self.routing_cache.fetch(
            &request.description,
            cache_context,
            Some(ROUTING_CACHE_THRESHOLD),
        ) {
            return cached;
        }

        let decision = self.router.route(request);
        self.routing_cache.insert(
            request.description.clone(),
            cache_context.clone(),
            decision.clone(),
            request.required_accuracy,
            decision.complexity,
        );
        decision
    }

    fn answer_cache(&self, approach: Approach) -> &SimilarityCache<CachedAnswer> {
        match approach {
            Approach::SequentialThinking => &self.sequential_cache,
            Approach::MultiAgentDiscussion => &self.discussion_cache,
            Approach::SingleAgent | Approach::EmergencyTemplate => &self.single_cache,
        }
    }

    fn fetch_cached_answer(
        &self,
        request: &TaskRequest,
        cache_context: &CacheContext,
        approach: Approach,
    ) -> Option<CachedAnswer> {
        let cache = self.answer_cache(approach);
        let hit = cache.fetch(&request.description, cache_context, None)?;
        self.events.emit(OrchestrationEvent::CacheHit {
            task_id: request.id.clone(),
            similarity_partition: cache.partition(),
        });
        Some(hit)
    }

    fn store_answer(
        &self,
        request: &TaskRequest,
        cache_context: &CacheContext,
        decision: &RoutingDecision,
        execution: &crate::fallback::ExecutionResult,
    ) {
        self.answer_cache(execution.approach).insert(
            request.description.clone(),
            cache_context.clone(),
            CachedAnswer {
                result: execution.result.clone(),
                confidence: execution.confidence,
                approach: execution.approach,
                provider: execution.provider,
                tokens_used: execution.tokens_used,
            },
            execution.confidence,
            decision.complexity,
        );
    }

    fn set_progress(&self, context_id: &str, stage: &str, percent: u8, activity: &str) {
        if let Err(e) = self.contexts.set_progress(context_id, stage, percent, activity) {
            warn!(context_id = %context_id, error = %e, "Failed to record progress");
        }
    }

    /// Fold what the execution learned back into the conversation context.
    fn record_context_outcome(
        &self,
        context_id: &str,
        decision: &RoutingDecision,
        execution: &crate::fallback::ExecutionResult,
    ) {
        let note = format!("approach {}: {}", decision.approach, decision.reason);
        if let Err(e) = self.contexts.add_decision(context_id, &note) {
            warn!(context_id = %context_id, error = %e, "Failed to record decision");
        }
        for insight in &execution.insights {
            if let Err(e) = self.contexts.add_insight(context_id, insight) {
                warn!(context_id = %context_id, error = %e, "Failed to record insight");
                break;
            }
        }
    }

    fn finish_context(&self, context_id: &str, result: &str) {
        if let Err(e) = self.contexts.append_message(context_id, "assistant", result) {
            warn!(context_id = %context_id, error = %e, "Failed to record assistant message");
        }
        if let Err(e) = self.contexts.set_final_result(context_id, result) {
            warn!(context_id = %context_id, error = %e, "Failed to record final result");
        }
        self.set_progress(context_id, "completed", 100, "final result recorded");
        self.events.emit(OrchestrationEvent::ContextUpdated {
            context_id: context_id.to_string(),
        });
    }

    /// Spawn background maintenance: cache cleanup, context cleanup, and
    /// metric snapshots. Call once after construction; [`shutdown`] stops
    /// the tasks.
    ///
    /// [`shutdown`]: OrchestrationService::shutdown
    pub fn start_maintenance(self: &Arc<Self>) {
        let mut handles = Vec::new();

        let service = Arc::clone(self);
        let cache_interval = self.config.cache.cleanup_interval_secs.max(1);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(cache_interval));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = service.sequential_cache.cleanup_expired()
                    + service.single_cache.cleanup_expired()
                    + service.discussion_cache.cleanup_expired()
                    + service.routing_cache.cleanup_expired();
                if removed > 0 {
                    info!(removed, "Cache maintenance pass");
                }
            }
        }));

        let service = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(CONTEXT_CLEANUP_INTERVAL_SECS));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.contexts.cleanup();
            }
        }));

        let intervals = [
            (self.config.monitoring.aggregation.real_time_secs, SnapshotKind::RealTime),
            (self.config.monitoring.aggregation.hourly_secs, SnapshotKind::Hourly),
            (self.config.monitoring.aggregation.daily_secs, SnapshotKind::Daily),
        ];
        for (secs, kind) in intervals {
            let service = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    service.monitor.snapshot(kind);
                }
            }));
        }

        if let Ok(mut maintenance) = self.maintenance.lock() {
            maintenance.extend(handles);
        }
    }

    /// Stop background maintenance tasks.
    pub fn shutdown(&self) {
        if let Ok(mut maintenance) = self.maintenance.lock() {
            for handle in maintenance.drain(..) {
                handle.abort();
            }
        }
        info!("Orchestration service shut down");
    }

    /// Subscribe to orchestration events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<OrchestrationEvent> {
        self.events.subscribe()
    }

    /// Conversation context store.
    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    /// Overall running metrics.
    pub fn metrics(&self) -> Totals {
        self.monitor.overall()
    }

    /// Full performance report.
    pub fn report(&self) -> PerformanceReport {
        self.monitor.report()
    }

    /// Per-partition cache counters.
    pub fn cache_stats(&self) -> HashMap<&'static str, CacheStats> {
        HashMap::from([
            (PARTITION_ANALYSIS, self.sequential_cache.stats()),
            (PARTITION_AGENT, self.single_cache.stats()),
            (PARTITION_DISCUSSION, self.discussion_cache.stats()),
            (PARTITION_ROUTING, self.routing_cache.stats()),
        ])
    }

    /// Fallback counters.
    pub fn fallback_stats(&self) -> FallbackStats {
        self.fallback.stats()
    }

    /// Service health summary.
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            started_at: self.started_at,
            active_contexts: self.contexts.len(),
            cache: self.cache_stats(),
            breakers: self.fallback.breaker_states(),
            fallback: self.fallback.stats(),
            overall: self.monitor.overall(),
        }
    }
}

fn validate(request: &TaskRequest) -> Result<(), OrchestrationError> {
    if request.description.trim().is_empty() {
        return Err(OrchestrationError::Validation {
            field: "description".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }
    if !request.required_accuracy.is_finite()
        || !(0.0..=1.0).contains(&request.required_accuracy)
    {
        return Err(OrchestrationError::Validation {
            field: "required_accuracy".to_string(),
            reason: "must be in 0.0..=1.0".to_string(),
        });
    }
    Ok(())
}

/// Build the cache fingerprint for a request from its metadata.
fn cache_context(request: &TaskRequest) -> CacheContext {
    let mut context = CacheContext::new(request.task_type, request.priority);

    if let Some(location) = request.metadata.get("location") {
        context = context.with_location(location.clone());
    }
    if let Some(kinds) = request.metadata.get("damage_kinds") {
        context = context.with_damage_kinds(
            kinds
                .split(',')
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        );
    }
    if let Some(season) = request.metadata.get("season") {
        context = context.with_season(season.clone());
    }

    context
}

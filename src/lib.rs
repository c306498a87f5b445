//! # Recovery Orchestrator
//!
//! An AI orchestration engine for disaster-recovery analysis. Tasks are
//! routed across three reasoning strategies depending on how complex, urgent,
//! and accuracy-sensitive they are, with similarity-aware caching, graceful
//! degradation through fallback chains, and built-in performance monitoring.
//!
//! ## Features
//!
//! - **Intelligent Routing**: Complexity and urgency scoring picks the
//!   cheapest strategy that fits the task
//! - **Single Agent**: One fast model call for simple or urgent work
//! - **Sequential Thinking**: Step-by-step analysis chains with early
//!   stopping and per-step recovery
//! - **Multi-Agent Discussion**: Specialist personas debate to consensus,
//!   with breakthrough rounds and deadlock detection
//! - **Similarity Cache**: Lookups match on meaning and situation, not
//!   exact keys
//! - **Graceful Degradation**: Per-provider circuit breakers, fallback
//!   chains, and terminal emergency templates mean a task always gets an
//!   answer
//! - **Conversation Context**: Bounded per-conversation memory with
//!   stakeholder detection
//! - **Performance Monitoring**: Running metrics, threshold alerts, and
//!   periodic snapshots
//!
//! ## Architecture
//!
//! ```text
//! TaskRequest -> OrchestrationService -> IntelligentRouter
//!                       |                       |
//!               SimilarityCache <----- FallbackManager
//!                                          |
//!                        Single / Sequential / Discussion engines
//!                                          |
//!                              ModelInvoker (HTTP providers)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use recovery_orchestrator::{Config, OrchestrationService, TaskRequest, TaskType};
//! use recovery_orchestrator::invoker::HttpModelInvoker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let invoker = Arc::new(HttpModelInvoker::new(&config.providers)?);
//!     let service = Arc::new(OrchestrationService::new(config, invoker));
//!     service.start_maintenance();
//!
//!     let request = TaskRequest::new(TaskType::DamageAssessment, "Assess flood damage");
//!     let outcome = service.orchestrate(request).await?;
//!     println!("{}", outcome.result);
//!
//!     service.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Specialist agent personas for multi-agent discussion.
pub mod agents;
/// Similarity-aware response cache.
pub mod cache;
/// Configuration, profiles, and environment loading.
pub mod config;
/// Conversation context tracking.
pub mod context;
/// Reasoning strategy engines.
pub mod engines;
/// Error types and result aliases.
pub mod error;
/// Typed orchestration events and the broadcast bus.
pub mod events;
/// Fallback chains, circuit breakers, and emergency templates.
pub mod fallback;
/// Model invocation trait and HTTP provider client.
pub mod invoker;
/// Performance monitoring and alerting.
pub mod monitor;
/// Structured-response parsing.
pub mod parser;
/// System prompts and prompt builders.
pub mod prompts;
/// Task routing across reasoning strategies.
pub mod routing;
/// The orchestration service facade.
pub mod service;
/// Text similarity primitives.
pub mod similarity;
/// Core domain types.
pub mod types;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use service::{OrchestrationService, ServiceStatus};
pub use types::{
    Approach, Provider, TaskOutcome, TaskPriority, TaskRequest, TaskType,
};

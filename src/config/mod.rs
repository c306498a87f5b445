//! Configuration for the orchestration engine.
//!
//! Configuration is layered: compiled-in defaults, then an optional named
//! profile, then individual environment variable overrides. Profiles mirror
//! common deployment shapes (development, production, emergency response,
//! high-accuracy review, cost-optimized batch work).

use std::env;
use std::str::FromStr;

use crate::error::AppError;
use crate::types::{Approach, Provider};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProviderConfig,
    pub routing: RoutingConfig,
    pub sequential: SequentialConfig,
    pub discussion: DiscussionConfig,
    pub cache: CacheConfig,
    pub fallback: FallbackConfig,
    pub context: ContextConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

/// Model provider endpoints and credentials
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Router thresholds
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Complexity (1-10) at or above which sequential thinking is chosen
    pub complexity_threshold: u8,
    /// Urgency (1-10) at or above which speed wins and single-agent is forced
    pub urgency_threshold: u8,
    /// Required accuracy (0-1) at or above which discussion is considered
    pub accuracy_threshold: f64,
    /// Approach used when no rule fires
    pub default_approach: Approach,
}

/// Sequential thinking engine settings
#[derive(Debug, Clone)]
pub struct SequentialConfig {
    pub max_steps: u32,
    pub timeout_per_step_ms: u64,
    pub confidence_threshold: f64,
    pub enable_recovery: bool,
}

/// Multi-agent discussion engine settings
#[derive(Debug, Clone)]
pub struct DiscussionConfig {
    pub max_rounds: u32,
    pub convergence_threshold: f64,
    pub max_participants: usize,
    pub require_unanimous: bool,
}

/// Response cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_memory_bytes: u64,
    pub max_entries: usize,
    pub default_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Combined similarity a lookup must reach to count as a hit
    pub similarity_threshold: f64,
}

/// Fallback and circuit breaker settings
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub max_retries: u32,
    pub retry_delays_ms: Vec<u64>,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_reset_ms: u64,
    pub provider_order: Vec<Provider>,
}

/// Conversation context store settings
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_context_age_ms: u64,
    pub max_contexts: usize,
    pub max_messages: usize,
    pub max_insights: usize,
    pub max_decisions: usize,
}

/// Performance monitor settings
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub metrics_retention_days: u32,
    pub alerts: AlertThresholds,
    pub aggregation: AggregationIntervals,
}

/// Thresholds that raise alerts when crossed
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub response_time_ms: u64,
    pub error_rate_pct: f64,
    pub accuracy: f64,
    pub cost_per_task: f64,
    pub cache_hit_rate_pct: f64,
}

/// Snapshot aggregation cadence
#[derive(Debug, Clone)]
pub struct AggregationIntervals {
    pub real_time_secs: u64,
    pub hourly_secs: u64,
    pub daily_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Named configuration profile applied over the base defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
    Emergency,
    HighAccuracy,
    CostOptimized,
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            "emergency" => Ok(Profile::Emergency),
            "high-accuracy" | "high_accuracy" => Ok(Profile::HighAccuracy),
            "cost-optimized" | "cost_optimized" => Ok(Profile::CostOptimized),
            _ => Err(format!("Unknown profile: {}", s)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            providers: ProviderConfig {
                anthropic_api_key: String::new(),
                anthropic_base_url: "https://api.anthropic.com".to_string(),
                openrouter_api_key: String::new(),
                openrouter_base_url: "https://openrouter.ai/api".to_string(),
                timeout_ms: 30_000,
                max_retries: 3,
                retry_delay_ms: 1_000,
            },
            routing: RoutingConfig {
                complexity_threshold: 7,
                urgency_threshold: 8,
                accuracy_threshold: 0.9,
                default_approach: Approach::SingleAgent,
            },
            sequential: SequentialConfig {
                max_steps: 10,
                timeout_per_step_ms: 30_000,
                confidence_threshold: 0.8,
                enable_recovery: true,
            },
            discussion: DiscussionConfig {
                max_rounds: 5,
                convergence_threshold: 0.8,
                max_participants: 5,
                require_unanimous: false,
            },
            cache: CacheConfig {
                max_memory_bytes: 100 * 1024 * 1024,
                max_entries: 10_000,
                default_ttl_secs: 3_600,
                cleanup_interval_secs: 300,
                similarity_threshold: 0.8,
            },
            fallback: FallbackConfig {
                max_retries: 3,
                retry_delays_ms: vec![1_000, 2_000, 4_000],
                circuit_breaker_threshold: 5,
                circuit_breaker_reset_ms: 60_000,
                provider_order: Provider::all().to_vec(),
            },
            context: ContextConfig {
                max_context_age_ms: 24 * 60 * 60 * 1_000,
                max_contexts: 1_000,
                max_messages: 50,
                max_insights: 20,
                max_decisions: 10,
            },
            monitoring: MonitoringConfig {
                metrics_retention_days: 7,
                alerts: AlertThresholds {
                    response_time_ms: 10_000,
                    error_rate_pct: 10.0,
                    accuracy: 0.7,
                    cost_per_task: 5.0,
                    cache_hit_rate_pct: 50.0,
                },
                aggregation: AggregationIntervals {
                    real_time_secs: 30,
                    hourly_secs: 3_600,
                    daily_secs: 86_400,
                },
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Reads `.env` if present. `ORCH_PROFILE` selects a named profile first;
    /// individual `ORCH_*` variables then override single fields.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(profile_str) = env::var("ORCH_PROFILE") {
            let profile = profile_str.parse().map_err(|e| AppError::Config {
                message: format!("ORCH_PROFILE: {}", e),
            })?;
            config = config.with_profile(profile);
        }

        config.providers.anthropic_api_key =
            env::var("ANTHROPIC_API_KEY").map_err(|_| AppError::Config {
                message: "ANTHROPIC_API_KEY is required".to_string(),
            })?;
        config.providers.openrouter_api_key =
            env::var("OPENROUTER_API_KEY").map_err(|_| AppError::Config {
                message: "OPENROUTER_API_KEY is required".to_string(),
            })?;

        if let Ok(url) = env::var("ANTHROPIC_BASE_URL") {
            config.providers.anthropic_base_url = url;
        }
        if let Ok(url) = env::var("OPENROUTER_BASE_URL") {
            config.providers.openrouter_base_url = url;
        }

        config.providers.timeout_ms = env::var("ORCH_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.providers.timeout_ms);
        config.providers.max_retries = env::var("ORCH_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.providers.max_retries);

        config.routing.complexity_threshold = env::var("ORCH_COMPLEXITY_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.routing.complexity_threshold);
        config.routing.urgency_threshold = env::var("ORCH_URGENCY_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.routing.urgency_threshold);

        config.sequential.max_steps = env::var("ORCH_MAX_STEPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.sequential.max_steps);
        config.sequential.timeout_per_step_ms = env::var("ORCH_STEP_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.sequential.timeout_per_step_ms);

        config.discussion.max_rounds = env::var("ORCH_MAX_ROUNDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.discussion.max_rounds);

        config.cache.max_entries = env::var("ORCH_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.cache.max_entries);
        config.cache.default_ttl_secs = env::var("ORCH_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.cache.default_ttl_secs);

        config.fallback.circuit_breaker_threshold = env::var("ORCH_BREAKER_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.fallback.circuit_breaker_threshold);

        config.logging.level = env::var("ORCH_LOG_LEVEL").unwrap_or(config.logging.level);
        config.logging.format = match env::var("ORCH_LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply a named profile's overrides over this configuration.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        match profile {
            Profile::Development => {
                self.sequential.max_steps = 5;
                self.sequential.timeout_per_step_ms = 15_000;
                self.discussion.max_rounds = 3;
                self.cache.max_memory_bytes = 50 * 1024 * 1024;
                self.cache.max_entries = 1_000;
                self.cache.default_ttl_secs = 1_800;
                self.fallback.max_retries = 2;
                self.fallback.retry_delays_ms = vec![500, 1_000];
                self.monitoring.metrics_retention_days = 1;
                self.monitoring.alerts.response_time_ms = 15_000;
                self.monitoring.alerts.error_rate_pct = 20.0;
            }
            Profile::Production => {
                self.routing.complexity_threshold = 6;
                self.sequential.max_steps = 12;
                self.sequential.timeout_per_step_ms = 45_000;
                self.discussion.max_rounds = 6;
                self.discussion.convergence_threshold = 0.85;
                self.cache.max_memory_bytes = 500 * 1024 * 1024;
                self.cache.max_entries = 50_000;
                self.cache.default_ttl_secs = 7_200;
                self.fallback.max_retries = 5;
                self.fallback.retry_delays_ms = vec![1_000, 2_000, 4_000, 8_000, 16_000];
                self.fallback.circuit_breaker_threshold = 3;
                self.context.max_context_age_ms = 7 * 24 * 60 * 60 * 1_000;
                self.monitoring.metrics_retention_days = 30;
                self.monitoring.alerts.response_time_ms = 8_000;
                self.monitoring.alerts.error_rate_pct = 5.0;
                self.monitoring.alerts.accuracy = 0.8;
                self.monitoring.alerts.cost_per_task = 3.0;
            }
            Profile::Emergency => {
                self.routing.default_approach = Approach::SingleAgent;
                self.routing.urgency_threshold = 6;
                self.routing.complexity_threshold = 9;
                self.sequential.max_steps = 3;
                self.sequential.timeout_per_step_ms = 10_000;
                self.discussion.max_rounds = 2;
                self.fallback.max_retries = 2;
                self.fallback.retry_delays_ms = vec![500, 1_000];
                self.monitoring.alerts.response_time_ms = 5_000;
                self.monitoring.alerts.error_rate_pct = 15.0;
            }
            Profile::HighAccuracy => {
                self.routing.default_approach = Approach::MultiAgentDiscussion;
                self.routing.accuracy_threshold = 0.7;
                self.sequential.max_steps = 15;
                self.sequential.confidence_threshold = 0.9;
                self.discussion.max_rounds = 8;
                self.discussion.convergence_threshold = 0.9;
                self.discussion.require_unanimous = true;
                self.monitoring.alerts.accuracy = 0.9;
                self.monitoring.alerts.error_rate_pct = 2.0;
            }
            Profile::CostOptimized => {
                self.routing.default_approach = Approach::SingleAgent;
                self.routing.complexity_threshold = 8;
                self.sequential.max_steps = 6;
                self.sequential.timeout_per_step_ms = 20_000;
                self.discussion.max_rounds = 3;
                self.cache.default_ttl_secs = 7_200;
                self.cache.max_memory_bytes = 200 * 1024 * 1024;
                self.fallback.provider_order = vec![Provider::AnthropicClaude];
                self.monitoring.alerts.cost_per_task = 2.0;
                self.monitoring.alerts.cache_hit_rate_pct = 70.0;
            }
        }
        self
    }

    /// Check internal consistency of threshold fields.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.routing.complexity_threshold == 0 || self.routing.complexity_threshold > 10 {
            return Err(AppError::Config {
                message: "complexity_threshold must be in 1..=10".to_string(),
            });
        }
        if self.routing.urgency_threshold == 0 || self.routing.urgency_threshold > 10 {
            return Err(AppError::Config {
                message: "urgency_threshold must be in 1..=10".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.discussion.convergence_threshold) {
            return Err(AppError::Config {
                message: "convergence_threshold must be in 0.0..=1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return Err(AppError::Config {
                message: "similarity_threshold must be in 0.0..=1.0".to_string(),
            });
        }
        if self.sequential.max_steps == 0 {
            return Err(AppError::Config {
                message: "max_steps must be at least 1".to_string(),
            });
        }
        if self.discussion.max_rounds == 0 {
            return Err(AppError::Config {
                message: "max_rounds must be at least 1".to_string(),
            });
        }
        if self.fallback.provider_order.is_empty() {
            return Err(AppError::Config {
                message: "provider_order must name at least one provider".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sequential.max_steps, 10);
        assert_eq!(config.discussion.max_rounds, 5);
        assert_eq!(config.fallback.circuit_breaker_threshold, 5);
        assert_eq!(config.cache.max_entries, 10_000);
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!("production".parse::<Profile>().unwrap(), Profile::Production);
        assert_eq!("dev".parse::<Profile>().unwrap(), Profile::Development);
        assert_eq!(
            "high-accuracy".parse::<Profile>().unwrap(),
            Profile::HighAccuracy
        );
        assert!("unknown".parse::<Profile>().is_err());
    }

    #[test]
    fn test_production_profile_overrides() {
        let config = Config::default().with_profile(Profile::Production);
        assert_eq!(config.routing.complexity_threshold, 6);
        assert_eq!(config.sequential.max_steps, 12);
        assert_eq!(config.fallback.circuit_breaker_threshold, 3);
        assert_eq!(config.fallback.retry_delays_ms.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_emergency_profile_prioritizes_speed() {
        let config = Config::default().with_profile(Profile::Emergency);
        assert_eq!(config.routing.urgency_threshold, 6);
        assert_eq!(config.sequential.max_steps, 3);
        assert_eq!(config.monitoring.alerts.response_time_ms, 5_000);
    }

    #[test]
    fn test_cost_optimized_restricts_providers() {
        let config = Config::default().with_profile(Profile::CostOptimized);
        assert_eq!(config.fallback.provider_order, vec![Provider::AnthropicClaude]);
        assert_eq!(config.monitoring.alerts.cache_hit_rate_pct, 70.0);
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let mut config = Config::default();
        config.routing.complexity_threshold = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.discussion.convergence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fallback.provider_order.clear();
        assert!(config.validate().is_err());
    }
}

//! Performance monitoring.
//!
//! Running (non-windowed) aggregates per approach and per provider, alert
//! checks against configured thresholds, and periodic snapshots with
//! retention pruning. Alerts are emitted as events and throttled per kind so
//! a sustained breach does not flood subscribers.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MonitoringConfig;
use crate::events::{EventBus, OrchestrationEvent};
use crate::types::{Approach, Provider};

/// Response-time scale used in provider reliability scoring
const RELIABILITY_LATENCY_SCALE_MS: f64 = 10_000.0;
/// Minimum recorded tasks before rate-based alerts can fire
const MIN_TASKS_FOR_RATE_ALERTS: u64 = 5;
/// Minimum seconds between alerts of the same kind
const ALERT_THROTTLE_SECS: i64 = 60;
/// Bound on retained alerts
const ALERT_LIMIT: usize = 200;

/// What a task execution looked like, from the monitor's perspective
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub approach: Approach,
    pub provider: Option<Provider>,
    pub duration_ms: u64,
    pub success: bool,
    pub confidence: f64,
    pub tokens_used: u64,
    pub cost: f64,
    pub cache_hit: bool,
}

/// Kind of threshold breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    SlowResponses,
    HighErrorRate,
    LowAccuracy,
    HighCostPerTask,
    LowCacheHitRate,
}

/// A threshold breach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub at: DateTime<Utc>,
}

/// Running totals for one grouping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Totals {
    pub tasks: u64,
    pub successes: u64,
    pub total_duration_ms: u64,
    pub total_confidence: f64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub cache_hits: u64,
}

impl Totals {
    fn record(&mut self, record: &TaskRecord) {
        self.tasks += 1;
        if record.success {
            self.successes += 1;
        }
        self.total_duration_ms += record.duration_ms;
        self.total_confidence += record.confidence;
        self.total_tokens += record.tokens_used;
        self.total_cost += record.cost;
        if record.cache_hit {
            self.cache_hits += 1;
        }
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.tasks == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.tasks as f64
    }

    pub fn success_rate(&self) -> f64 {
        if self.tasks == 0 {
            return 0.0;
        }
        self.successes as f64 / self.tasks as f64
    }

    pub fn error_rate_pct(&self) -> f64 {
        if self.tasks == 0 {
            return 0.0;
        }
        (1.0 - self.success_rate()) * 100.0
    }

    pub fn avg_confidence(&self) -> f64 {
        if self.tasks == 0 {
            return 0.0;
        }
        self.total_confidence / self.tasks as f64
    }

    pub fn cost_per_task(&self) -> f64 {
        if self.tasks == 0 {
            return 0.0;
        }
        self.total_cost / self.tasks as f64
    }

    pub fn cache_hit_rate_pct(&self) -> f64 {
        if self.tasks == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / self.tasks as f64 * 100.0
    }
}

/// Cadence of an aggregation snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotKind {
    RealTime,
    Hourly,
    Daily,
}

/// Point-in-time copy of the overall totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub at: DateTime<Utc>,
    pub totals: Totals,
}

/// Full performance report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub overall: Totals,
    pub by_approach: HashMap<Approach, Totals>,
    pub by_provider: HashMap<Provider, ProviderReport>,
    pub recent_alerts: Vec<Alert>,
}

/// Per-provider section of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReport {
    pub totals: Totals,
    pub reliability: f64,
}

struct MonitorInner {
    overall: Totals,
    by_approach: HashMap<Approach, Totals>,
    by_provider: HashMap<Provider, Totals>,
    alerts: VecDeque<Alert>,
    last_alert_at: HashMap<AlertKind, DateTime<Utc>>,
    snapshots: Vec<Snapshot>,
}

/// Collects metrics and raises alerts.
pub struct PerformanceMonitor {
    config: MonitoringConfig,
    events: EventBus,
    inner: Mutex<MonitorInner>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitoringConfig, events: EventBus) -> Self {
        Self {
            config,
            events,
            inner: Mutex::new(MonitorInner {
                overall: Totals::default(),
                by_approach: HashMap::new(),
                by_provider: HashMap::new(),
                alerts: VecDeque::new(),
                last_alert_at: HashMap::new(),
                snapshots: Vec::new(),
            }),
        }
    }

    /// Record one completed task and run alert checks.
    pub fn record_task(&self, record: TaskRecord) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        inner.overall.record(&record);
        inner
            .by_approach
            .entry(record.approach)
            .or_default()
            .record(&record);
        if let Some(provider) = record.provider {
            inner.by_provider.entry(provider).or_default().record(&record);
        }

        self.check_alerts(&mut inner);
    }

    /// Blended reliability for a provider: success rate and latency headroom.
    pub fn provider_reliability(&self, provider: Provider) -> f64 {
        let Ok(inner) = self.inner.lock() else {
            return 0.0;
        };
        inner
            .by_provider
            .get(&provider)
            .map(reliability)
            .unwrap_or(0.0)
    }

    /// Take an aggregation snapshot and prune expired data.
    pub fn snapshot(&self, kind: SnapshotKind) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let snapshot = Snapshot {
            kind,
            at: Utc::now(),
            totals: inner.overall.clone(),
        };
        inner.snapshots.push(snapshot);
        self.prune_locked(&mut inner);
    }

    /// Retained snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.inner
            .lock()
            .map(|inner| inner.snapshots.clone())
            .unwrap_or_default()
    }

    pub fn overall(&self) -> Totals {
        self.inner
            .lock()
            .map(|inner| inner.overall.clone())
            .unwrap_or_default()
    }

    pub fn report(&self) -> PerformanceReport {
        let Ok(inner) = self.inner.lock() else {
            return PerformanceReport {
                generated_at: Utc::now(),
                overall: Totals::default(),
                by_approach: HashMap::new(),
                by_provider: HashMap::new(),
                recent_alerts: Vec::new(),
            };
        };

        PerformanceReport {
            generated_at: Utc::now(),
            overall: inner.overall.clone(),
            by_approach: inner.by_approach.clone(),
            by_provider: inner
                .by_provider
                .iter()
                .map(|(p, totals)| {
                    (
                        *p,
                        ProviderReport {
                            totals: totals.clone(),
                            reliability: reliability(totals),
                        },
                    )
                })
                .collect(),
            recent_alerts: inner.alerts.iter().rev().take(20).rev().cloned().collect(),
        }
    }

    fn check_alerts(&self, inner: &mut MonitorInner) {
        let overall = inner.overall.clone();
        let thresholds = &self.config.alerts;

        let mut breaches: Vec<(AlertKind, f64, f64, String)> = Vec::new();

        if overall.avg_duration_ms() > thresholds.response_time_ms as f64 {
            breaches.push((
                AlertKind::SlowResponses,
                overall.avg_duration_ms(),
                thresholds.response_time_ms as f64,
                format!(
                    "average response time {:.0}ms exceeds {}ms",
                    overall.avg_duration_ms(),
                    thresholds.response_time_ms
                ),
            ));
        }

        if overall.tasks >= MIN_TASKS_FOR_RATE_ALERTS {
            if overall.error_rate_pct() > thresholds.error_rate_pct {
                breaches.push((
                    AlertKind::HighErrorRate,
                    overall.error_rate_pct(),
                    thresholds.error_rate_pct,
                    format!(
                        "error rate {:.1}% exceeds {:.1}%",
                        overall.error_rate_pct(),
                        thresholds.error_rate_pct
                    ),
                ));
            }
            if overall.avg_confidence() < thresholds.accuracy {
                breaches.push((
                    AlertKind::LowAccuracy,
                    overall.avg_confidence(),
                    thresholds.accuracy,
                    format!(
                        "average confidence {:.2} below {:.2}",
                        overall.avg_confidence(),
                        thresholds.accuracy
                    ),
                ));
            }
            if overall.cache_hit_rate_pct() < thresholds.cache_hit_rate_pct {
                breaches.push((
                    AlertKind::LowCacheHitRate,
                    overall.cache_hit_rate_pct(),
                    thresholds.cache_hit_rate_pct,
                    format!(
                        "cache hit rate {:.1}% below {:.1}%",
                        overall.cache_hit_rate_pct(),
                        thresholds.cache_hit_rate_pct
                    ),
                ));
            }
        }

        if overall.cost_per_task() > thresholds.cost_per_task {
            breaches.push((
                AlertKind::HighCostPerTask,
                overall.cost_per_task(),
                thresholds.cost_per_task,
                format!(
                    "cost per task {:.2} exceeds {:.2}",
                    overall.cost_per_task(),
                    thresholds.cost_per_task
                ),
            ));
        }

        let now = Utc::now();
        for (kind, value, threshold, message) in breaches {
            let throttled = inner
                .last_alert_at
                .get(&kind)
                .map(|at| now - *at < Duration::seconds(ALERT_THROTTLE_SECS))
                .unwrap_or(false);
            if throttled {
                continue;
            }

            let alert = Alert {
                kind,
                message: message.clone(),
                value,
                threshold,
                at: now,
            };
            warn!(kind = ?kind, value, threshold, "{}", message);
            inner.last_alert_at.insert(kind, now);
            inner.alerts.push_back(alert.clone());
            while inner.alerts.len() > ALERT_LIMIT {
                inner.alerts.pop_front();
            }
            self.events.emit(OrchestrationEvent::AlertRaised { alert });
        }
    }

    fn prune_locked(&self, inner: &mut MonitorInner) {
        let cutoff = Utc::now() - Duration::days(self.config.metrics_retention_days as i64);
        inner.snapshots.retain(|s| s.at >= cutoff);
        inner.alerts.retain(|a| a.at >= cutoff);
    }
}

fn reliability(totals: &Totals) -> f64 {
    let latency_headroom =
        (1.0 - totals.avg_duration_ms() / RELIABILITY_LATENCY_SCALE_MS).max(0.0);
    (totals.success_rate() + latency_headroom) / 2.0
}

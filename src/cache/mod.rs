//! Similarity-aware response cache.
//!
//! Lookups match on meaning, not exact keys: a candidate entry must first
//! pass a context-similarity gate (task type, location, damage kinds,
//! urgency, season), then the blend of context and content similarity must
//! clear the caller's threshold. Entry lifetime scales with how confident
//! and how complex the cached work was; eviction removes the least valuable
//! tenth when the store outgrows its budget.
//!
//! Values are isolated by cloning on insert and fetch, so callers can never
//! mutate a cached entry in place.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::similarity::{jaccard, jaccard_sets};
use crate::types::{TaskPriority, TaskType};

/// Context similarity a candidate must reach before content is considered
const CONTEXT_GATE: f64 = 0.7;
/// Dynamic TTL never exceeds this multiple of the base TTL
const MAX_TTL_MULTIPLIER: f64 = 3.0;
/// Fraction of entries removed per eviction pass
const EVICTION_FRACTION: f64 = 0.1;

const WEIGHT_TASK_TYPE: f64 = 0.4;
const WEIGHT_LOCATION: f64 = 0.2;
const WEIGHT_DAMAGE_KINDS: f64 = 0.2;
const WEIGHT_URGENCY: f64 = 0.1;
const WEIGHT_SEASON: f64 = 0.1;

/// Situational fingerprint of a cached analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheContext {
    pub task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
    #[serde(default)]
    pub damage_kinds: Vec<String>,
    pub urgency: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
}

impl CacheContext {
    pub fn new(task_type: TaskType, urgency: TaskPriority) -> Self {
        Self {
            task_type,
            location_hint: None,
            damage_kinds: Vec::new(),
            urgency,
            season: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_hint = Some(location.into());
        self
    }

    pub fn with_damage_kinds(mut self, kinds: Vec<String>) -> Self {
        self.damage_kinds = kinds;
        self
    }

    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }

    /// Weighted similarity between two contexts, in [0, 1].
    pub fn similarity(&self, other: &CacheContext) -> f64 {
        let mut score = 0.0;

        if self.task_type == other.task_type {
            score += WEIGHT_TASK_TYPE;
        }

        match (&self.location_hint, &other.location_hint) {
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => score += WEIGHT_LOCATION,
            (None, None) => score += WEIGHT_LOCATION,
            _ => {}
        }

        score += WEIGHT_DAMAGE_KINDS * jaccard_sets(&self.damage_kinds, &other.damage_kinds);

        if self.urgency == other.urgency {
            score += WEIGHT_URGENCY;
        }

        match (&self.season, &other.season) {
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => score += WEIGHT_SEASON,
            (None, None) => score += WEIGHT_SEASON,
            _ => {}
        }

        score
    }
}

/// Aggregate cache counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub memory_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage of lookups.
    pub fn hit_rate_pct(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64 * 100.0
    }
}

struct Entry<V> {
    value: V,
    description: String,
    context: CacheContext,
    size_bytes: u64,
    created_at: Instant,
    expires_at: Instant,
    hit_count: u64,
    last_access: Instant,
    /// Accuracy feedback, starts at the insert confidence
    accuracy: f64,
}

struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    memory_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// One cache partition holding values of a single type.
pub struct SimilarityCache<V> {
    partition: &'static str,
    config: CacheConfig,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone + Serialize> SimilarityCache<V> {
    pub fn new(partition: &'static str, config: CacheConfig) -> Self {
        Self {
            partition,
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                memory_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Name of this cache partition.
    pub fn partition(&self) -> &'static str {
        self.partition
    }

    /// Insert a value, returning its entry key.
    ///
    /// TTL scales with confidence and complexity: confident answers to hard
    /// problems are worth keeping longest.
    pub fn insert(
        &self,
        description: impl Into<String>,
        context: CacheContext,
        value: V,
        confidence: f64,
        complexity: u8,
    ) -> String {
        let description = description.into();
        let now = Instant::now();
        let ttl = self.dynamic_ttl(confidence, complexity);

        let size_bytes = serde_json::to_vec(&value)
            .map(|v| v.len() as u64)
            .unwrap_or(0)
            + description.len() as u64;

        let key = format!("{}:{}", self.partition, uuid::Uuid::new_v4());
        let entry = Entry {
            value,
            description,
            context,
            size_bytes,
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
            last_access: now,
            accuracy: confidence.clamp(0.0, 1.0),
        };

        let Ok(mut inner) = self.inner.lock() else {
            return key;
        };
        inner.memory_bytes += size_bytes;
        inner.entries.insert(key.clone(), entry);

        if inner.entries.len() > self.config.max_entries
            || inner.memory_bytes > self.config.max_memory_bytes
        {
            self.evict_locked(&mut inner);
        }

        trace!(
            partition = self.partition,
            key = %key,
            ttl_secs = ttl.as_secs(),
            "Cached entry"
        );
        key
    }

    /// Look up the best similar entry at or above `threshold` (combined
    /// context and content similarity). Returns a clone of the value.
    pub fn fetch(
        &self,
        description: &str,
        context: &CacheContext,
        threshold: Option<f64>,
    ) -> Option<V> {
        let threshold = threshold.unwrap_or(self.config.similarity_threshold);
        let now = Instant::now();

        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };

        let mut best: Option<(String, f64)> = None;
        for (key, entry) in inner.entries.iter() {
            if entry.expires_at <= now {
                continue;
            }

            let context_sim = context.similarity(&entry.context);
            if context_sim < CONTEXT_GATE {
                continue;
            }

            let content_sim = jaccard(description, &entry.description);
            let combined = (context_sim + content_sim) / 2.0;
            if combined < threshold {
                continue;
            }

            if best.as_ref().map(|(_, s)| combined > *s).unwrap_or(true) {
                best = Some((key.clone(), combined));
            }
        }

        match best {
            Some((key, similarity)) => {
                inner.hits += 1;
                let entry = inner.entries.get_mut(&key)?;
                entry.hit_count += 1;
                entry.last_access = now;
                debug!(
                    partition = self.partition,
                    key = %key,
                    similarity,
                    "Cache hit"
                );
                Some(entry.value.clone())
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Record downstream accuracy feedback for an entry.
    pub fn record_accuracy(&self, key: &str, accuracy: f64) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(entry) = inner.entries.get_mut(key) {
                entry.accuracy = accuracy.clamp(0.0, 1.0);
            }
        }
    }

    /// Hit count for an entry, if it still exists.
    pub fn hit_count(&self, key: &str) -> Option<u64> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.entries.get(key).map(|e| e.hit_count))
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.memory_bytes = inner.memory_bytes.saturating_sub(entry.size_bytes);
            }
        }

        if !expired.is_empty() {
            debug!(
                partition = self.partition,
                removed = expired.len(),
                "Expired cache entries removed"
            );
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        let Ok(inner) = self.inner.lock() else {
            return CacheStats::default();
        };
        CacheStats {
            entries: inner.entries.len(),
            memory_bytes: inner.memory_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    fn dynamic_ttl(&self, confidence: f64, complexity: u8) -> Duration {
        let base = self.config.default_ttl_secs as f64;
        let scaled = base
            * (0.5 + confidence.clamp(0.0, 1.0))
            * (1.0 + complexity.min(10) as f64 / 10.0);
        Duration::from_secs_f64(scaled.min(base * MAX_TTL_MULTIPLIER))
    }

    /// Remove the least valuable tenth of entries.
    ///
    /// An entry's eviction score rises with age and size and falls with use
    /// and accuracy; the highest-scoring entries go first.
    fn evict_locked(&self, inner: &mut CacheInner<V>) {
        let now = Instant::now();
        let mut scored: Vec<(String, f64)> = inner
            .entries
            .iter()
            .map(|(key, entry)| {
                let age_secs = now.duration_since(entry.created_at).as_secs_f64();
                let minutes = (age_secs / 60.0).max(1.0 / 60.0);
                let hits_per_minute = entry.hit_count as f64 / minutes;
                let score = age_secs - hits_per_minute * 100.0 - entry.accuracy * 50.0
                    + entry.size_bytes as f64 / 1000.0;
                (key.clone(), score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let to_evict = ((inner.entries.len() as f64 * EVICTION_FRACTION).ceil() as usize).max(1);
        for (key, _) in scored.into_iter().take(to_evict) {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.memory_bytes = inner.memory_bytes.saturating_sub(entry.size_bytes);
                inner.evictions += 1;
            }
        }

        debug!(
            partition = self.partition,
            evicted = to_evict,
            remaining = inner.entries.len(),
            "Cache eviction pass"
        );
    }
}

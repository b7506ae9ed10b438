//! Bounded TTL cache with idle-per-access eviction.
//!
//! Entries expire `ttl` after they were written. Expiry is enforced lazily on
//! read and proactively by [`Cache::run_sweeper`]. When the cache is full,
//! the entry with the highest idle-per-access score is evicted before a new
//! key is inserted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default time-to-live for entries written without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default capacity.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default interval between expiry sweeps.
pub const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied by [`Cache::set`].
    pub ttl: Duration,
    /// Maximum number of entries held at once. Zero disables caching.
    pub max_size: usize,
    /// Interval of the background expiry sweep.
    pub check_period: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
            check_period: DEFAULT_CHECK_PERIOD,
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed_at: Instant,
    /// Insertion sequence, used for ordering and eviction ties.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Idle time, divided by the number of reads when there were any.
    fn eviction_score(&self, now: Instant) -> f64 {
        let idle = now
            .saturating_duration_since(self.last_accessed_at)
            .as_secs_f64();
        if self.access_count == 0 {
            idle
        } else {
            idle / self.access_count as f64
        }
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

impl<V> CacheState<V> {
    /// Entries in insertion order.
    fn ordered(&self) -> Vec<(&String, &CacheEntry<V>)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries
    }

    fn evict_one(&mut self, now: Instant) -> Option<String> {
        let mut victim: Option<(&String, f64, u64)> = None;
        for (key, entry) in &self.entries {
            let score = entry.eviction_score(now);
            let replace = match victim {
                None => true,
                Some((_, best, best_seq)) => {
                    score > best || (score == best && entry.seq < best_seq)
                }
            };
            if replace {
                victim = Some((key, score, entry.seq));
            }
        }
        let key = victim.map(|(key, _, _)| key.clone())?;
        self.entries.remove(&key);
        Some(key)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of cache contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_items: usize,
    /// Entries past their TTL that have not been swept or read yet.
    pub expired_items: usize,
    pub average_access_count: f64,
    pub oldest_entry_age_ms: Option<u64>,
    pub newest_entry_age_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Thread-safe bounded cache keyed by string.
///
/// Shared via `Arc<Cache<V>>`. Values are cloned out on read.
pub struct Cache<V> {
    config: CacheConfig,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> Cache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the value for `key`, recording the access.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.lock();

        let Some(entry) = state.entries.get_mut(key) else {
            tracing::debug!(key, "Cache miss");
            return None;
        };

        if entry.is_expired(now) {
            state.entries.remove(key);
            tracing::debug!(key, "Cache entry expired");
            return None;
        }

        entry.access_count += 1;
        entry.last_accessed_at = now;
        tracing::debug!(key, access_count = entry.access_count, "Cache hit");
        Some(entry.value.clone())
    }

    /// Insert `value` under `key` with the configured default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.config.ttl);
    }

    /// Insert `value` under `key`, expiring `ttl` from now.
    ///
    /// Writing a new key into a full cache evicts one entry first.
    /// Overwriting an existing key resets its access statistics. Does
    /// nothing when `max_size` is zero.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        if self.config.max_size == 0 {
            tracing::debug!(key = %key, "Caching disabled, entry not stored");
            return;
        }
        let now = Instant::now();
        let mut state = self.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_size {
            if let Some(evicted) = state.evict_one(now) {
                tracing::debug!(key = %evicted, "Evicted least used cache entry");
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: now,
                ttl,
                access_count: 0,
                last_accessed_at: now,
                seq,
            },
        );
        tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cached entry");
    }

    /// Whether a live entry exists. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        match state.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                state.entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock().entries.remove(key).is_some();
        if removed {
            tracing::debug!(key, "Deleted cache entry");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
        tracing::info!("Cache cleared");
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .ordered()
            .into_iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<V> {
        self.lock()
            .ordered()
            .into_iter()
            .map(|(_, entry)| entry.value.clone())
            .collect()
    }

    /// Key/value pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, V)> {
        self.lock()
            .ordered()
            .into_iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Cleaned up expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.lock();
        let total_items = state.entries.len();

        let expired_items = state
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .count();

        let average_access_count = if total_items == 0 {
            0.0
        } else {
            let total: u64 = state.entries.values().map(|e| e.access_count).sum();
            total as f64 / total_items as f64
        };

        let age_ms = |entry: &CacheEntry<V>| {
            now.saturating_duration_since(entry.created_at).as_millis() as u64
        };
        let oldest_entry_age_ms = state.entries.values().map(age_ms).max();
        let newest_entry_age_ms = state.entries.values().map(age_ms).min();

        CacheStats {
            total_items,
            expired_items,
            average_access_count,
            oldest_entry_age_ms,
            newest_entry_age_ms,
        }
    }

    /// Run the expiry sweep every `check_period` until `cancel` fires.
    pub async fn run_sweeper(&self, cancel: CancellationToken) {
        let period = self.config.check_period;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Cache sweeper cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep_expired();
                }
            }
        }
    }
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Weighted LRU cache for served media payloads.
//!
//! Entries are bounded twice: by item count (plain LRU eviction inside
//! [`WeightedCache::put`]) and by total payload bytes, which is enforced
//! separately by [`WeightedCache::recalculate_weight`]. The byte check runs
//! after insertion from the serving path, so one oversized insert can sit
//! above budget until the next recalculation.

use bytes::Bytes;
use lru::LruCache;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Bytes per megabyte when interpreting the configured budget.
pub const BYTES_PER_MB: u64 = 1_000_000;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Largest payload, removed because the byte budget was exceeded.
    Heaviest,
    /// Least recently used, removed for item capacity or as the weight fallback.
    LeastRecentlyUsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub key: String,
    pub size: u64,
    pub reason: EvictionReason,
}

struct CacheState {
    /// Capacity is enforced by `WeightedCache::put`, so the list itself is unbounded.
    entries: LruCache<String, Bytes>,
    total_bytes: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
        }
    }

    fn remove(&mut self, key: &str) -> Option<Bytes> {
        let payload = self.entries.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(payload.len() as u64);
        Some(payload)
    }

    fn pop_least_recent(&mut self) -> Option<Eviction> {
        let (key, payload) = self.entries.pop_lru()?;
        self.total_bytes = self.total_bytes.saturating_sub(payload.len() as u64);
        Some(Eviction {
            key,
            size: payload.len() as u64,
            reason: EvictionReason::LeastRecentlyUsed,
        })
    }

    /// Largest entry; equal sizes resolve to the least recently used one.
    fn heaviest_key(&self) -> Option<String> {
        // Iteration runs most to least recent and `max_by_key` keeps the last maximum.
        self.entries
            .iter()
            .max_by_key(|(_, payload)| payload.len())
            .map(|(key, _)| key.clone())
    }
}

/// Bounded key -> payload store shared by all request handlers.
///
/// Every operation takes the internal lock, so readers never observe a
/// half-applied insert or eviction.
pub struct WeightedCache {
    state: Mutex<CacheState>,
    capacity: usize,
    budget_bytes: u64,
}

impl WeightedCache {
    /// `capacity` is the maximum number of entries (at least one is kept),
    /// `budget_mb` the total payload threshold in megabytes.
    pub fn new(capacity: usize, budget_mb: u64) -> Self {
        Self::with_budget_bytes(capacity, budget_mb.saturating_mul(BYTES_PER_MB))
    }

    pub fn with_budget_bytes(capacity: usize, budget_bytes: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::new()),
            capacity: capacity.max(1),
            budget_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the payload and marks it most recently used. A miss is `None`.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let hit = self.lock().entries.get(key).cloned();
        debug!(key, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Inserts or replaces `key`. A new key arriving at item capacity first
    /// evicts the least recently used entry.
    pub fn put(&self, key: impl Into<String>, payload: Bytes) -> Option<Eviction> {
        let key = key.into();
        let mut state = self.lock();

        let mut evicted = None;
        if state.remove(&key).is_none() && state.entries.len() >= self.capacity {
            evicted = state.pop_least_recent();
            if let Some(eviction) = &evicted {
                warn!(key = %eviction.key, size = eviction.size, "cache at capacity, evicted oldest entry");
            }
        }

        state.total_bytes += payload.len() as u64;
        state.entries.put(key, payload);
        evicted
    }

    /// Sums resident payload sizes and, while the total is above budget,
    /// evicts the heaviest entry (falling back to the least recently used one
    /// when no heaviest entry can be removed).
    pub fn recalculate_weight(&self) -> Vec<Eviction> {
        let mut state = self.lock();
        let total: u64 = state
            .entries
            .iter()
            .map(|(_, payload)| payload.len() as u64)
            .sum();
        state.total_bytes = total;

        debug!(
            total_mb = total / BYTES_PER_MB,
            budget_mb = self.budget_bytes / BYTES_PER_MB,
            "cache weight"
        );

        let mut evictions = Vec::new();
        while state.total_bytes > self.budget_bytes {
            let heaviest = state
                .heaviest_key()
                .and_then(|key| state.remove(&key).map(|payload| (key, payload)));

            let eviction = match heaviest {
                Some((key, payload)) => Eviction {
                    key,
                    size: payload.len() as u64,
                    reason: EvictionReason::Heaviest,
                },
                None => match state.pop_least_recent() {
                    Some(eviction) => eviction,
                    None => {
                        warn!("cache over budget but nothing left to evict");
                        break;
                    }
                },
            };

            warn!(key = %eviction.key, size = eviction.size, reason = ?eviction.reason, "cache over budget, evicted entry");
            evictions.push(eviction);
        }
        evictions
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    /// Drops every entry.
    pub fn purge(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }
}

//! Thread-safe cache metrics with atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for [`QueryCache`](super::QueryCache).
///
/// Relaxed ordering throughout; the numbers are for monitoring only.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups answered from the cache.
    pub hits: AtomicU64,
    /// Lookups that found nothing usable, including expired and stale entries.
    pub misses: AtomicU64,
    /// Entries dropped because the cache was over capacity.
    pub evictions: AtomicU64,
    /// Entries dropped because their TTL had passed.
    pub expirations: AtomicU64,
    /// Entries dropped because the store changed since they were computed.
    pub invalidations: AtomicU64,
}

impl CacheMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Hits over total lookups, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

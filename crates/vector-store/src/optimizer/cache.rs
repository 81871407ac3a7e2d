//! TTL query-result cache with insertion-order eviction.

use std::time::{Duration, Instant};

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::types::SearchMatch;
use crate::vector::fingerprint;

use super::metrics::CacheMetrics;

/// Cache key: content fingerprint of the raw query vector plus `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: u64,
    pub k: usize,
}

impl CacheKey {
    pub fn new(fingerprint: u64, k: usize) -> Self {
        Self { fingerprint, k }
    }

    /// Key for `vector` as given by the caller, before normalization.
    pub fn for_query(vector: &[f32], k: usize) -> Self {
        Self::new(fingerprint(vector), k)
    }
}

/// One cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub matches: Vec<SearchMatch>,
    /// Store generation the result was computed at.
    pub generation: u64,
    pub inserted_at: Instant,
}

impl CacheEntry {
    #[inline]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Bounded result cache.
///
/// # Eviction
///
/// 1. TTL: an entry older than `ttl` is removed when looked up.
/// 2. Generation: an entry computed at another store generation is removed
///    when looked up.
/// 3. Capacity: inserting past `capacity` removes the oldest inserted entry.
///    Lookups do not change the order.
pub struct QueryCache {
    entries: Mutex<LinkedHashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
    metrics: CacheMetrics,
}

impl QueryCache {
    /// `capacity` of 0 is treated as 1.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LinkedHashMap::new()),
            ttl,
            capacity: capacity.max(1),
            metrics: CacheMetrics::new(),
        }
    }

    /// Cached matches for `key`, if present, fresh and from `generation`.
    #[must_use]
    pub fn get(&self, key: &CacheKey, generation: u64) -> Option<Vec<SearchMatch>> {
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get(key) else {
            self.metrics.record_miss();
            return None;
        };

        if entry.is_expired(self.ttl) {
            entries.remove(key);
            self.metrics.record_expiration();
            self.metrics.record_miss();
            debug!(k = key.k, "Cache entry expired");
            return None;
        }

        if entry.generation != generation {
            let cached = entry.generation;
            entries.remove(key);
            self.metrics.record_invalidation();
            self.metrics.record_miss();
            debug!(k = key.k, cached, current = generation, "Cache entry stale");
            return None;
        }

        self.metrics.record_hit();
        Some(entry.matches.clone())
    }

    /// Insert or replace the result for `key`.
    ///
    /// A replaced key moves to the back of the eviction order.
    pub fn put(&self, key: CacheKey, matches: Vec<SearchMatch>, generation: u64) {
        let mut entries = self.entries.lock();

        entries.remove(&key);
        entries.insert(
            key,
            CacheEntry {
                matches,
                generation,
                inserted_at: Instant::now(),
            },
        );

        while entries.len() > self.capacity {
            if entries.pop_front().is_none() {
                break;
            }
            self.metrics.record_eviction();
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

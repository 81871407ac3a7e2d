//! Core QueryOptimizer implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};
use tracing::{debug, info};

use crate::atomic::AtomicVectorStore;
use crate::config::OptimizerConfig;
use crate::error::StoreResult;
use crate::types::SearchMatch;
use crate::vector::normalized;

use super::cache::{CacheKey, QueryCache};
use super::recommend::{evaluate, Recommendation};

/// Memory picture of the process, the index and the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAnalysis {
    /// Resident memory of this process. `None` if the OS would not say.
    pub process_memory_bytes: Option<u64>,
    pub system_used_bytes: u64,
    pub system_total_bytes: u64,
    /// `total_vectors * dimension * 4`.
    pub index_memory_bytes: usize,
    pub total_vectors: usize,
    pub cache_entries: usize,
}

/// Read-only performance layer over a shared store.
///
/// Delegates every structural operation to the store and never writes to
/// it. Cached results are tagged with the store generation, so a committed
/// mutation makes older entries misses.
pub struct QueryOptimizer {
    store: Arc<AtomicVectorStore>,
    cache: QueryCache,
    config: OptimizerConfig,
}

impl QueryOptimizer {
    /// # Errors
    /// `StoreError::InvalidConfig` if `config` is invalid.
    pub fn new(store: Arc<AtomicVectorStore>, config: OptimizerConfig) -> StoreResult<Self> {
        config.validate()?;
        let cache = QueryCache::new(config.cache_ttl(), config.cache_capacity);
        Ok(Self::with_cache(store, config, cache))
    }

    /// Use a prebuilt cache instead of one derived from `config`.
    pub fn with_cache(store: Arc<AtomicVectorStore>, config: OptimizerConfig, cache: QueryCache) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Unit-length copy of `vector` in the store's dimension.
    pub fn normalize(&self, vector: &[f32]) -> StoreResult<Vec<f32>> {
        normalized(vector, self.store.config().dimension)
    }

    /// Cache lookup by fingerprint and `k` at the current store generation.
    pub fn get(&self, fingerprint: u64, k: usize) -> Option<Vec<SearchMatch>> {
        self.cache
            .get(&CacheKey::new(fingerprint, k), self.store.generation())
    }

    /// Cache insert at the current store generation.
    pub fn put(&self, fingerprint: u64, k: usize, matches: Vec<SearchMatch>) {
        self.cache.put(
            CacheKey::new(fingerprint, k),
            matches,
            self.store.generation(),
        );
    }

    /// Query through the cache.
    ///
    /// The generation is read before the store query, so a result computed
    /// across a concurrent commit is tagged with the older generation and
    /// will not be served afterwards.
    pub fn cached_query(&self, vector: &[f32], k: usize) -> StoreResult<Vec<SearchMatch>> {
        if !self.config.cache_enabled {
            return self.store.query(vector, k);
        }

        let key = CacheKey::for_query(vector, k);
        let generation = self.store.generation();
        if let Some(matches) = self.cache.get(&key, generation) {
            debug!(k, "Query served from cache");
            return Ok(matches);
        }

        let matches = self.store.query(vector, k)?;
        self.cache.put(key, matches.clone(), generation);
        Ok(matches)
    }

    /// One batched search for all `vectors`. Bypasses the cache.
    pub fn batch_query<V>(&self, vectors: &[V], k: usize) -> StoreResult<Vec<Vec<SearchMatch>>>
    where
        V: AsRef<[f32]> + Sync,
    {
        self.store.query_batch(vectors, k)
    }

    pub fn analyze_memory(&self) -> StoreResult<MemoryAnalysis> {
        let (total_vectors, index_memory_bytes) = self
            .store
            .with_store(|store| (store.len(), store.index().memory_bytes()))?;

        let mut sys = System::new();
        sys.refresh_memory();
        let process_memory_bytes = get_current_pid().ok().and_then(|pid| {
            sys.refresh_process(pid);
            sys.process(pid).map(|process| process.memory())
        });

        Ok(MemoryAnalysis {
            process_memory_bytes,
            system_used_bytes: sys.used_memory(),
            system_total_bytes: sys.total_memory(),
            index_memory_bytes,
            total_vectors,
            cache_entries: self.cache.len(),
        })
    }

    /// Advisory list; takes no action.
    pub fn recommend(&self) -> StoreResult<Vec<Recommendation>> {
        let analysis = self.analyze_memory()?;
        let advice = evaluate(&analysis, &self.config, self.config.cache_enabled);
        for item in &advice {
            info!("Recommendation: {}", item);
        }
        Ok(advice)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[inline]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[inline]
    pub fn store(&self) -> &Arc<AtomicVectorStore> {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

//! Tests for the query cache and QueryOptimizer.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::atomic::AtomicVectorStore;
use crate::config::{OptimizerConfig, StoreConfig};
use crate::types::{GroupId, ImageId, SearchMatch};
use crate::vector::fingerprint;

const DIM: usize = 4;

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

fn hit(id: i64) -> SearchMatch {
    SearchMatch {
        image_id: ImageId(id),
        path: format!("img_{}.jpg", id),
        group_id: GroupId(1),
        score: 0.9,
        position: 0,
    }
}

fn store_with(dir: &TempDir, n: usize) -> Arc<AtomicVectorStore> {
    let store = AtomicVectorStore::open(StoreConfig::new(
        DIM,
        dir.path().join("v.index"),
        dir.path().join("v.meta"),
    ))
    .unwrap();
    let vectors: Vec<Vec<f32>> = (0..n).map(|i| unit(i % DIM)).collect();
    let ids: Vec<ImageId> = (1..=n as i64).map(ImageId).collect();
    let paths: Vec<String> = (1..=n).map(|i| format!("img_{}.jpg", i)).collect();
    let groups = vec![GroupId(1); n];
    store
        .atomic_add_batch(&vectors, &ids, &paths, &groups)
        .unwrap();
    Arc::new(store)
}

// =========================================================================
// CACHE TESTS
// =========================================================================

#[test]
fn test_cache_hit_returns_stored_result() {
    let cache = QueryCache::new(Duration::from_secs(60), 10);
    let key = CacheKey::new(42, 5);
    cache.put(key, vec![hit(1)], 0);

    assert_eq!(cache.get(&key, 0), Some(vec![hit(1)]));
    assert_eq!(cache.metrics().hits.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cache_key_includes_k() {
    let cache = QueryCache::new(Duration::from_secs(60), 10);
    cache.put(CacheKey::new(42, 5), vec![hit(1)], 0);
    assert!(cache.get(&CacheKey::new(42, 3), 0).is_none());
    assert_eq!(cache.metrics().misses.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cache_entry_expires_after_ttl() {
    let cache = QueryCache::new(Duration::from_millis(50), 10);
    let key = CacheKey::new(1, 1);
    cache.put(key, vec![hit(1)], 0);
    assert!(cache.get(&key, 0).is_some());

    thread::sleep(Duration::from_millis(80));

    assert!(cache.get(&key, 0).is_none());
    assert!(!cache.contains(&key));
    assert_eq!(cache.metrics().expirations.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cache_evicts_oldest_inserted() {
    let cache = QueryCache::new(Duration::from_secs(60), 2);
    let (a, b, c) = (CacheKey::new(1, 1), CacheKey::new(2, 1), CacheKey::new(3, 1));
    cache.put(a, vec![hit(1)], 0);
    cache.put(b, vec![hit(2)], 0);
    // Reading `a` does not protect it: eviction is by insertion order.
    assert!(cache.get(&a, 0).is_some());
    cache.put(c, vec![hit(3)], 0);

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&a));
    assert!(cache.contains(&b));
    assert!(cache.contains(&c));
    assert_eq!(cache.metrics().evictions.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cache_reinsert_moves_key_to_back() {
    let cache = QueryCache::new(Duration::from_secs(60), 2);
    let (a, b, c) = (CacheKey::new(1, 1), CacheKey::new(2, 1), CacheKey::new(3, 1));
    cache.put(a, vec![hit(1)], 0);
    cache.put(b, vec![hit(2)], 0);
    cache.put(a, vec![hit(10)], 0);
    cache.put(c, vec![hit(3)], 0);

    assert!(cache.contains(&a));
    assert!(!cache.contains(&b));
    assert_eq!(cache.get(&a, 0), Some(vec![hit(10)]));
}

#[test]
fn test_cache_stale_generation_is_miss() {
    let cache = QueryCache::new(Duration::from_secs(60), 10);
    let key = CacheKey::new(9, 2);
    cache.put(key, vec![hit(1)], 3);

    assert!(cache.get(&key, 4).is_none());
    assert!(cache.is_empty());
    assert_eq!(cache.metrics().invalidations.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cache_zero_capacity_holds_one() {
    let cache = QueryCache::new(Duration::from_secs(60), 0);
    cache.put(CacheKey::new(1, 1), vec![], 0);
    cache.put(CacheKey::new(2, 1), vec![], 0);
    assert_eq!(cache.capacity(), 1);
    assert_eq!(cache.len(), 1);
}

// =========================================================================
// OPTIMIZER TESTS
// =========================================================================

#[test]
fn test_new_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = OptimizerConfig {
        cache_capacity: 0,
        ..Default::default()
    };
    assert!(QueryOptimizer::new(store_with(&dir, 1), config).is_err());
}

#[test]
fn test_cached_query_hits_on_repeat() {
    let dir = TempDir::new().unwrap();
    let optimizer = QueryOptimizer::new(store_with(&dir, 3), OptimizerConfig::default()).unwrap();

    let first = optimizer.cached_query(&unit(1), 2).unwrap();
    let second = optimizer.cached_query(&unit(1), 2).unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].image_id, ImageId(2));
    let metrics = optimizer.cache().metrics();
    assert_eq!(metrics.hits.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.misses.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cached_query_recomputes_after_delete() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, 3);
    let optimizer = QueryOptimizer::new(store.clone(), OptimizerConfig::default()).unwrap();

    let before = optimizer.cached_query(&unit(1), 1).unwrap();
    assert_eq!(before[0].image_id, ImageId(2));

    store.atomic_delete_by_image_id(ImageId(2)).unwrap();

    let after = optimizer.cached_query(&unit(1), 3).unwrap();
    assert!(after.iter().all(|m| m.image_id != ImageId(2)));
    let again = optimizer.cached_query(&unit(1), 1).unwrap();
    assert_ne!(again[0].image_id, ImageId(2));
}

#[test]
fn test_cached_query_empty_after_reset_in_transaction() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, 1);
    let optimizer = QueryOptimizer::new(store.clone(), OptimizerConfig::default()).unwrap();

    assert_eq!(optimizer.cached_query(&unit(0), 1).unwrap().len(), 1);
    let generation = store.generation();

    // reset() saves on its own, leaving the store clean when the body returns.
    store.transaction(|s| s.reset()).unwrap();

    assert_eq!(store.generation(), generation + 1);
    assert!(optimizer.cached_query(&unit(0), 1).unwrap().is_empty());
    assert_eq!(optimizer.cache().metrics().invalidations.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cached_query_after_ttl_recomputes() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, 2);
    let config = OptimizerConfig::default();
    let cache = QueryCache::new(Duration::from_millis(30), config.cache_capacity);
    let optimizer = QueryOptimizer::with_cache(store, config, cache);

    optimizer.cached_query(&unit(0), 1).unwrap();
    thread::sleep(Duration::from_millis(60));
    optimizer.cached_query(&unit(0), 1).unwrap();

    let metrics = optimizer.cache().metrics();
    assert_eq!(metrics.hits.load(Ordering::Relaxed), 0);
    assert_eq!(metrics.misses.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.expirations.load(Ordering::Relaxed), 1);
}

#[test]
fn test_cache_disabled_bypasses_cache() {
    let dir = TempDir::new().unwrap();
    let config = OptimizerConfig {
        cache_enabled: false,
        ..Default::default()
    };
    let optimizer = QueryOptimizer::new(store_with(&dir, 2), config).unwrap();

    optimizer.cached_query(&unit(0), 1).unwrap();
    assert!(optimizer.cache().is_empty());
}

#[test]
fn test_get_put_by_fingerprint() {
    let dir = TempDir::new().unwrap();
    let optimizer = QueryOptimizer::new(store_with(&dir, 1), OptimizerConfig::default()).unwrap();
    let fp = fingerprint(&unit(0));

    assert!(optimizer.get(fp, 1).is_none());
    optimizer.put(fp, 1, vec![hit(7)]);
    assert_eq!(optimizer.get(fp, 1), Some(vec![hit(7)]));

    optimizer.clear_cache();
    assert!(optimizer.get(fp, 1).is_none());
}

#[test]
fn test_batch_query_matches_individual_queries() {
    let dir = TempDir::new().unwrap();
    let store = store_with(&dir, 4);
    let optimizer = QueryOptimizer::new(store.clone(), OptimizerConfig::default()).unwrap();
    let queries = vec![unit(3), unit(0), vec![1.0, 1.0, 0.0, 0.0]];

    let batched = optimizer.batch_query(&queries, 2).unwrap();
    assert_eq!(batched.len(), 3);
    for (query, result) in queries.iter().zip(&batched) {
        assert_eq!(result, &store.query(query, 2).unwrap());
    }
}

#[test]
fn test_normalize() {
    let dir = TempDir::new().unwrap();
    let optimizer = QueryOptimizer::new(store_with(&dir, 1), OptimizerConfig::default()).unwrap();
    let v = optimizer.normalize(&[0.0, 0.0, 3.0, 4.0]).unwrap();
    assert!((v[2] - 0.6).abs() < 1e-6);
    assert!(optimizer.normalize(&[1.0, 2.0]).is_err());
}

#[test]
fn test_analyze_memory() {
    let dir = TempDir::new().unwrap();
    let optimizer = QueryOptimizer::new(store_with(&dir, 3), OptimizerConfig::default()).unwrap();
    optimizer.cached_query(&unit(0), 1).unwrap();

    let analysis = optimizer.analyze_memory().unwrap();
    assert_eq!(analysis.total_vectors, 3);
    assert_eq!(analysis.index_memory_bytes, 3 * DIM * 4);
    assert_eq!(analysis.cache_entries, 1);
}

#[test]
fn test_recommend_on_cold_cache() {
    let dir = TempDir::new().unwrap();
    let config = OptimizerConfig {
        partition_threshold: 2,
        compression_threshold: 100,
        memory_warning_mb: u64::MAX,
        ..Default::default()
    };
    let optimizer = QueryOptimizer::new(store_with(&dir, 3), config).unwrap();

    let advice = optimizer.recommend().unwrap();
    assert_eq!(
        advice,
        vec![
            Recommendation::UsePartitionedIndex {
                vectors: 3,
                threshold: 2
            },
            Recommendation::EnableQueryCache,
        ]
    );
}

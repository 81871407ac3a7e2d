//! Query cache and advisory thresholds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    100
}

fn default_partition_threshold() -> usize {
    50_000
}

fn default_compression_threshold() -> usize {
    100_000
}

fn default_memory_warning_mb() -> u64 {
    2_000
}

/// Configuration for [`QueryOptimizer`](crate::optimizer::QueryOptimizer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Whether `cached_query` consults the cache at all.
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Entries older than this are misses. Default: 300 (5 minutes)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum cached queries; the oldest-inserted entry is evicted beyond it.
    /// Default: 100
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Vector count above which a partitioned index is recommended.
    #[serde(default = "default_partition_threshold")]
    pub partition_threshold: usize,

    /// Vector count above which a compressed index is recommended.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    /// Process RSS (MB) above which a disk-backed index is recommended.
    #[serde(default = "default_memory_warning_mb")]
    pub memory_warning_mb: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_cache_enabled(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            partition_threshold: default_partition_threshold(),
            compression_threshold: default_compression_threshold(),
            memory_warning_mb: default_memory_warning_mb(),
        }
    }
}

impl OptimizerConfig {
    #[inline]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate optimizer configuration values.
    ///
    /// # Errors
    /// - `StoreError::InvalidConfig` if cache_capacity is 0
    /// - `StoreError::InvalidConfig` if compression_threshold < partition_threshold
    pub fn validate(&self) -> StoreResult<()> {
        if self.cache_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "cache_capacity must be > 0".to_string(),
            ));
        }

        if self.compression_threshold < self.partition_threshold {
            return Err(StoreError::InvalidConfig(format!(
                "compression_threshold ({}) cannot be below partition_threshold ({})",
                self.compression_threshold, self.partition_threshold
            )));
        }

        Ok(())
    }
}

//! Advisory capacity heuristics.
//!
//! Rules only produce advice. Nothing here changes the store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::OptimizerConfig;

use super::core::MemoryAnalysis;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// One piece of advice from [`QueryOptimizer::recommend`](super::QueryOptimizer::recommend).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    /// Exact search over this many vectors is slow; partition it.
    UsePartitionedIndex { vectors: usize, threshold: usize },
    /// Full-precision vectors take too much memory; compress them.
    UseCompressedIndex { vectors: usize, threshold: usize },
    /// The process itself is large; move the index to disk.
    UseDiskBackedIndex { process_mb: u64, threshold_mb: u64 },
    /// The query cache is disabled or has never been populated.
    EnableQueryCache,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::UsePartitionedIndex { vectors, threshold } => write!(
                f,
                "{} vectors exceed {}: consider a partitioned (approximate) index",
                vectors, threshold
            ),
            Recommendation::UseCompressedIndex { vectors, threshold } => write!(
                f,
                "{} vectors exceed {}: consider compressed vector storage",
                vectors, threshold
            ),
            Recommendation::UseDiskBackedIndex {
                process_mb,
                threshold_mb,
            } => write!(
                f,
                "process memory {}MB exceeds {}MB: consider a disk-backed index",
                process_mb, threshold_mb
            ),
            Recommendation::EnableQueryCache => {
                write!(f, "query cache is unused: enable caching for repeated queries")
            }
        }
    }
}

/// Apply every rule to `analysis`, in a fixed order.
pub fn evaluate(
    analysis: &MemoryAnalysis,
    config: &OptimizerConfig,
    cache_enabled: bool,
) -> Vec<Recommendation> {
    let mut advice = Vec::new();

    if analysis.total_vectors > config.partition_threshold {
        advice.push(Recommendation::UsePartitionedIndex {
            vectors: analysis.total_vectors,
            threshold: config.partition_threshold,
        });
    }

    if analysis.total_vectors > config.compression_threshold {
        advice.push(Recommendation::UseCompressedIndex {
            vectors: analysis.total_vectors,
            threshold: config.compression_threshold,
        });
    }

    if let Some(bytes) = analysis.process_memory_bytes {
        let process_mb = bytes / BYTES_PER_MB;
        if process_mb > config.memory_warning_mb {
            advice.push(Recommendation::UseDiskBackedIndex {
                process_mb,
                threshold_mb: config.memory_warning_mb,
            });
        }
    }

    if !cache_enabled || analysis.cache_entries == 0 {
        advice.push(Recommendation::EnableQueryCache);
    }

    advice
}

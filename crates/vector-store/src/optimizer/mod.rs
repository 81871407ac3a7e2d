//! Query optimization layer.
//!
//! [`QueryOptimizer`] sits above an
//! [`AtomicVectorStore`](crate::atomic::AtomicVectorStore) and never mutates
//! it. It adds:
//!
//! - a TTL result cache with insertion-order eviction ([`QueryCache`])
//! - batched querying
//! - memory analysis and advisory [`Recommendation`]s

mod cache;
mod core;
mod metrics;
mod recommend;

#[cfg(test)]
mod tests;

pub use self::core::{MemoryAnalysis, QueryOptimizer};
pub use cache::{CacheEntry, CacheKey, QueryCache};
pub use metrics::CacheMetrics;
pub use recommend::Recommendation;

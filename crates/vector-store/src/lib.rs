//! Mutable exact-search vector store.
//!
//! The underlying [`FlatIpIndex`] only supports append and brute-force inner
//! product search. This crate builds a mutable store on top of it:
//!
//! - [`VectorStore`]: four position-aligned sequences (image ids, paths,
//!   group ids, vectors) next to the index, with insert, delete by id or
//!   group, query, paired-file persistence and consistency diagnostics.
//!   Every delete rebuilds the index from the survivors.
//! - [`AtomicVectorStore`]: one reentrant lock around the store, file
//!   snapshots with rollback, temp-file-then-rename saves, batch deletes
//!   with a single rebuild, health checks.
//! - [`QueryOptimizer`]: TTL result cache with insertion-order eviction,
//!   batched queries, memory analysis and advisory recommendations.
//! - [`FaceIndexService`]: glue between the store and the external feature
//!   extractor, person registry and attribute predictor.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vector_store::{AtomicVectorStore, GroupId, ImageId, StoreConfig};
//!
//! let store = Arc::new(AtomicVectorStore::open(StoreConfig::new(
//!     512,
//!     "index/vectors.index",
//!     "index/vectors_meta.bin",
//! ))?);
//!
//! store.atomic_add_batch(&[embedding], &[ImageId(1)], &["a.jpg".into()], &[GroupId(100)])?;
//! let matches = store.query(&embedding, 5)?;
//! ```
//!
//! The library never installs a tracing subscriber.

pub mod atomic;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod optimizer;
pub mod service;
pub mod store;
pub mod types;
pub mod vector;

pub use atomic::{AtomicVectorStore, BackupSnapshot, FileOps, StdFileOps};
pub use config::{OptimizerConfig, ServiceConfig, StoreConfig, VectorStoreSettings};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use index::{FlatIpIndex, SearchResult};
pub use optimizer::{CacheKey, CacheMetrics, MemoryAnalysis, QueryCache, QueryOptimizer, Recommendation};
pub use service::{
    AttributePredictor, EnrollOutcome, EnrollRequest, FaceIndexService, FeatureExtractor, Gender,
    IdentifiedMatch, Person, PersonAttributes, PersonRegistry,
};
pub use store::VectorStore;
pub use types::{
    BatchDeleteOutcome, ConsistencyReport, DeleteOutcome, GroupDeleteOutcome, GroupId,
    HealthReport, ImageId, RecordPage, RecordSample, RecordSummary, SearchMatch, SequenceLengths,
    StoreStats, UpdateOutcome, VectorRecord,
};

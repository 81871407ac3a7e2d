//! Exact-search structure.
//!
//! `FlatIpIndex` is a brute-force inner-product index: append and search,
//! nothing else. For unit vectors the score is cosine similarity.
//!
//! # Memory Footprint
//!
//! `ntotal * dimension * 4` bytes. 100K vectors of dimension 512 take about
//! 200MB, at which point a partitioned index becomes worth considering
//! (see [`crate::optimizer::Recommendation`]).

pub mod flat;
pub mod search_result;

pub use flat::{FlatIpIndex, INDEX_MAGIC, INDEX_VERSION};
pub use search_result::SearchResult;

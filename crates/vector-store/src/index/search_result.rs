//! Flat exact-search output.
//!
//! [`FlatIpIndex::search`](super::FlatIpIndex::search) returns one flat
//! buffer for all queries: results for query `i` occupy `i * k .. (i + 1) * k`.
//! `k` here is the effective k, `min(requested, ntotal)`, so every slot holds
//! a real hit.

use std::cmp::Ordering;

/// Result of a (possibly batched) exact inner-product search.
///
/// # Memory Layout
///
/// For n queries with k hits each:
/// - `positions.len() == n * k`
/// - `scores.len() == n * k`
///
/// Within one query, hits are ordered by descending score, ties by
/// ascending position.
#[derive(Clone, Debug, Default)]
pub struct SearchResult {
    /// Ordinal positions in the index (flattened, k per query)
    pub positions: Vec<usize>,
    /// Inner-product scores (flattened, k per query), higher = more similar
    pub scores: Vec<f32>,
    /// Hits per query
    pub k: usize,
    /// Number of queries in this result
    pub num_queries: usize,
}

impl SearchResult {
    /// Create a new SearchResult from flat buffers.
    ///
    /// # Panics (debug only)
    ///
    /// Debug assertions verify array lengths match `k * num_queries`.
    #[inline]
    pub fn new(positions: Vec<usize>, scores: Vec<f32>, k: usize, num_queries: usize) -> Self {
        debug_assert_eq!(
            positions.len(),
            k * num_queries,
            "positions.len() ({}) != k ({}) * num_queries ({})",
            positions.len(),
            k,
            num_queries
        );
        debug_assert_eq!(
            scores.len(),
            k * num_queries,
            "scores.len() ({}) != k ({}) * num_queries ({})",
            scores.len(),
            k,
            num_queries
        );
        Self {
            positions,
            scores,
            k,
            num_queries,
        }
    }

    /// An empty result for `num_queries` queries (k = 0).
    #[inline]
    pub fn empty(num_queries: usize) -> Self {
        Self {
            positions: Vec::new(),
            scores: Vec::new(),
            k: 0,
            num_queries,
        }
    }

    /// (position, score) pairs for one query.
    ///
    /// # Panics
    ///
    /// Panics if `query_idx >= num_queries`.
    ///
    /// # Example
    ///
    /// ```
    /// use vector_store::index::SearchResult;
    ///
    /// let result = SearchResult::new(vec![4, 1, 0, 2], vec![0.9, 0.5, 0.8, 0.1], 2, 2);
    /// let q1: Vec<_> = result.query_results(1).collect();
    /// assert_eq!(q1, vec![(0, 0.8), (2, 0.1)]);
    /// ```
    pub fn query_results(&self, query_idx: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        assert!(
            query_idx < self.num_queries,
            "query_idx ({}) >= num_queries ({})",
            query_idx,
            self.num_queries
        );

        let start = query_idx * self.k;
        let end = start + self.k;

        self.positions[start..end]
            .iter()
            .copied()
            .zip(self.scores[start..end].iter().copied())
    }

    /// Convenience: collect `query_results()` into a Vec.
    #[inline]
    pub fn query_results_vec(&self, query_idx: usize) -> Vec<(usize, f32)> {
        self.query_results(query_idx).collect()
    }

    /// Best hit for a query, if any.
    #[inline]
    pub fn top_result(&self, query_idx: usize) -> Option<(usize, f32)> {
        self.query_results(query_idx).next()
    }

    /// All hits as (query_idx, position, score) triples.
    pub fn all_results(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.num_queries)
            .flat_map(move |q| self.query_results(q).map(move |(pos, score)| (q, pos, score)))
    }

    /// Highest score across all queries.
    pub fn max_score(&self) -> Option<f32> {
        self.scores
            .iter()
            .copied()
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    /// Lowest score across all queries.
    pub fn min_score(&self) -> Option<f32> {
        self.scores
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    /// Total number of hits across all queries.
    #[inline]
    pub fn total_results(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Number of queries.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_queries
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }
}

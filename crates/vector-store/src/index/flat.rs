//! Append-only exact inner-product index.
//!
//! The only structural operations are `add` and `search`. There is no
//! removal: deleting a vector means building a new index from the
//! survivors (see [`FlatIpIndex::from_rows`]).
//!
//! # File Format
//!
//! Inside the [`codec`](crate::codec) envelope (magic `VSIX`, version 1):
//! - `dimension`: u32 LE
//! - `ntotal`: u64 LE
//! - `ntotal * dimension` f32 LE, row-major

use rayon::prelude::*;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::vector::dot;

use super::search_result::SearchResult;

/// Magic bytes for the structure file.
pub const INDEX_MAGIC: [u8; 4] = *b"VSIX";

/// Structure file format version.
pub const INDEX_VERSION: u8 = 1;

/// dimension(4) + ntotal(8)
const INDEX_HEADER_LEN: usize = 12;

/// Brute-force inner-product index over row-major f32 storage.
///
/// Vectors are expected to be L2-normalized by the caller; the index itself
/// does no normalization so that scores are plain inner products.
#[derive(Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    /// Create an empty index.
    ///
    /// # Errors
    /// `StoreError::InvalidConfig` if dimension is 0.
    pub fn new(dimension: usize) -> StoreResult<Self> {
        if dimension == 0 {
            return Err(StoreError::InvalidConfig(
                "dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Build an index from rows in order. Used for rebuild-after-delete.
    pub fn from_rows<V: AsRef<[f32]>>(dimension: usize, rows: &[V]) -> StoreResult<Self> {
        let mut index = Self::new(dimension)?;
        index.data.reserve(rows.len() * dimension);
        for row in rows {
            let row = row.as_ref();
            if row.len() != dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            index.data.extend_from_slice(row);
        }
        Ok(index)
    }

    /// Append vectors (flattened, row-major).
    ///
    /// # Errors
    /// `StoreError::DimensionMismatch` if `vectors.len()` is not a multiple of dimension.
    pub fn add(&mut self, vectors: &[f32]) -> StoreResult<()> {
        let remainder = vectors.len() % self.dimension;
        if remainder != 0 {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: remainder,
            });
        }
        self.data.extend_from_slice(vectors);
        Ok(())
    }

    /// Exact top-k search for one or more queries (flattened, row-major).
    ///
    /// Returns `min(k, ntotal)` hits per query ordered by descending score,
    /// ties by ascending position. An empty index or `k == 0` yields an
    /// empty result. Multiple queries are scored in parallel.
    pub fn search(&self, queries: &[f32], k: usize) -> StoreResult<SearchResult> {
        let remainder = queries.len() % self.dimension;
        if remainder != 0 {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: remainder,
            });
        }

        let n_queries = queries.len() / self.dimension;
        let k = k.min(self.ntotal());
        if k == 0 {
            return Ok(SearchResult::empty(n_queries));
        }

        let per_query: Vec<Vec<(usize, f32)>> = if n_queries > 1 {
            queries
                .par_chunks(self.dimension)
                .map(|query| self.top_k(query, k))
                .collect()
        } else {
            queries
                .chunks(self.dimension)
                .map(|query| self.top_k(query, k))
                .collect()
        };

        let mut positions = Vec::with_capacity(n_queries * k);
        let mut scores = Vec::with_capacity(n_queries * k);
        for hits in per_query {
            for (position, score) in hits {
                positions.push(position);
                scores.push(score);
            }
        }

        Ok(SearchResult::new(positions, scores, k, n_queries))
    }

    fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let scores: Vec<f32> = self
            .data
            .chunks_exact(self.dimension)
            .map(|row| dot(query, row))
            .collect();

        // Total order: score descending, then position ascending.
        let by_rank = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));

        let mut order: Vec<usize> = (0..scores.len()).collect();
        if k < order.len() {
            order.select_nth_unstable_by(k - 1, by_rank);
            order.truncate(k);
        }
        order.sort_unstable_by(by_rank);

        order.into_iter().map(|pos| (pos, scores[pos])).collect()
    }

    /// Stored vector at `position`.
    #[inline]
    pub fn reconstruct(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Every stored vector, in position order.
    pub fn reconstruct_all(&self) -> Vec<Vec<f32>> {
        self.data
            .chunks_exact(self.dimension)
            .map(<[f32]>::to_vec)
            .collect()
    }

    /// Raw row-major storage.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Drop all vectors, keeping the dimension.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Number of stored vectors.
    #[inline]
    pub fn ntotal(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Approximate memory held by vector storage.
    #[inline]
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Encode into the structure file format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(INDEX_HEADER_LEN + self.memory_bytes());
        payload.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        payload.extend_from_slice(&(self.ntotal() as u64).to_le_bytes());
        extend_le_f32(&mut payload, &self.data);
        codec::seal(INDEX_MAGIC, INDEX_VERSION, &payload)
    }

    /// Decode from the structure file format.
    ///
    /// # Errors
    /// - `StoreError::CorruptedData` on envelope or length errors
    /// - `StoreError::IncompatibleIndex` if the stored dimension differs from `expected_dimension`
    pub fn from_bytes(data: &[u8], expected_dimension: usize) -> StoreResult<Self> {
        const LOCATION: &str = "structure file";

        let payload = codec::open(data, INDEX_MAGIC, INDEX_VERSION, LOCATION)?;
        if payload.len() < INDEX_HEADER_LEN {
            return Err(StoreError::corrupted(LOCATION, "missing index header"));
        }

        let dimension = u32::from_le_bytes(
            payload[0..4]
                .try_into()
                .map_err(|_| StoreError::corrupted(LOCATION, "invalid dimension bytes"))?,
        ) as usize;
        let ntotal = u64::from_le_bytes(
            payload[4..12]
                .try_into()
                .map_err(|_| StoreError::corrupted(LOCATION, "invalid ntotal bytes"))?,
        ) as usize;

        if dimension != expected_dimension {
            return Err(StoreError::IncompatibleIndex {
                expected: expected_dimension,
                actual: dimension,
            });
        }

        let body = &payload[INDEX_HEADER_LEN..];
        let expected_len = ntotal
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| StoreError::corrupted(LOCATION, "ntotal overflows"))?;
        if body.len() != expected_len {
            return Err(StoreError::corrupted(
                LOCATION,
                format!(
                    "expected {} bytes of vector data for ntotal={}, got {}",
                    expected_len,
                    ntotal,
                    body.len()
                ),
            ));
        }

        let data = body
            .chunks_exact(4)
            .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();

        let mut index = Self::new(dimension)?;
        index.data = data;
        Ok(index)
    }
}

impl std::fmt::Debug for FlatIpIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIpIndex")
            .field("ntotal", &self.ntotal())
            .field("dimension", &self.dimension)
            .finish()
    }
}

/// Append `values` as little-endian `f32`.
#[cfg(target_endian = "little")]
#[inline]
fn extend_le_f32(out: &mut Vec<u8>, values: &[f32]) {
    out.extend_from_slice(bytemuck::cast_slice(values));
}

#[cfg(not(target_endian = "little"))]
#[inline]
fn extend_le_f32(out: &mut Vec<u8>, values: &[f32]) {
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

//! Vector math used on the ingest and query paths.
//!
//! Everything that enters the index goes through [`normalized`], so the
//! inner product of two stored vectors is their cosine similarity.

use rayon::prelude::*;

use crate::error::{StoreError, StoreResult};

/// Norms below this are treated as zero.
pub const MIN_NORM: f32 = 1e-12;

/// Inner product of two equal-length slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Largest absolute component, 0 for an empty slice.
#[inline]
fn max_abs(v: &[f32]) -> f32 {
    v.iter().fold(0.0f32, |m, x| m.max(x.abs()))
}

/// Norm of `v / scale`. Stays finite for any finite `v`.
fn scaled_norm(v: &[f32], scale: f32) -> f32 {
    v.iter()
        .map(|x| {
            let s = x / scale;
            s * s
        })
        .sum::<f32>()
        .sqrt()
}

/// Euclidean norm, scaled by the largest component so squares never overflow.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    let scale = max_abs(v);
    if scale == 0.0 {
        return 0.0;
    }
    scale * scaled_norm(v, scale)
}

/// Check dimension and finiteness, then return a unit-length copy.
///
/// # Errors
/// - `StoreError::DimensionMismatch` if `v.len() != dimension`
/// - `StoreError::InvalidVector` if any component is NaN/infinite or the norm is zero
pub fn normalized(v: &[f32], dimension: usize) -> StoreResult<Vec<f32>> {
    if v.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: v.len(),
        });
    }
    if let Some(index) = v.iter().position(|x| !x.is_finite()) {
        return Err(StoreError::InvalidVector(format!(
            "component {} is not finite ({})",
            index, v[index]
        )));
    }

    // Divide by the largest component first; the remaining norm is in [1, sqrt(n)].
    let scale = max_abs(v);
    let unit_norm = if scale == 0.0 { 0.0 } else { scaled_norm(v, scale) };
    if scale * unit_norm < MIN_NORM {
        return Err(StoreError::InvalidVector(format!(
            "cannot normalize vector with norm {}",
            scale * unit_norm
        )));
    }

    Ok(v.iter().map(|x| (x / scale) / unit_norm).collect())
}

/// Normalize a batch together, returning one flat row-major buffer.
///
/// Fails on the first invalid row.
pub fn normalized_batch<V>(vectors: &[V], dimension: usize) -> StoreResult<Vec<f32>>
where
    V: AsRef<[f32]> + Sync,
{
    let rows: Vec<Vec<f32>> = vectors
        .par_iter()
        .map(|v| normalized(v.as_ref(), dimension))
        .collect::<StoreResult<_>>()?;

    let mut flat = Vec::with_capacity(rows.len() * dimension);
    for row in rows {
        flat.extend_from_slice(&row);
    }
    Ok(flat)
}

/// 64-bit content fingerprint of a vector, used as a cache key.
///
/// Hashes the exact little-endian bit patterns, so `0.0` and `-0.0` differ.
#[inline]
pub fn fingerprint(v: &[f32]) -> u64 {
    xxhash_rust::xxh64::xxh64(bytemuck::cast_slice(v), 0)
}

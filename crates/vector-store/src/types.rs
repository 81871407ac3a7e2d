//! Core value types shared by the store, the transactional wrapper and the
//! optimizer.
//!
//! Identifiers are canonical fixed-width integers. There is no string form
//! of an id inside the store; conversion happens once at ingestion.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Unique identifier of a stored image vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub i64);

/// Identifier of the logical subject that groups several image vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ImageId {
    fn from(value: i64) -> Self {
        ImageId(value)
    }
}

impl From<i64> for GroupId {
    fn from(value: i64) -> Self {
        GroupId(value)
    }
}

/// One logical record: id, path, group and its (normalized) vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub image_id: ImageId,
    pub path: String,
    pub group_id: GroupId,
    pub vector: Vec<f32>,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub image_id: ImageId,
    pub path: String,
    pub group_id: GroupId,
    /// Inner product of unit vectors, i.e. cosine similarity in [-1, 1].
    pub score: f32,
    /// Ordinal position in the index at query time. Invalidated by any delete.
    pub position: usize,
}

/// Record without its vector, used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub position: usize,
    pub image_id: ImageId,
    pub path: String,
    pub group_id: GroupId,
}

/// Result of deleting a single image id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record was removed and the index rebuilt.
    Deleted { image_id: ImageId, position: usize },
    /// No record holds the id. Nothing changed.
    NotFound,
}

impl DeleteOutcome {
    #[inline]
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted { .. })
    }

    /// Convert a negative result into [`StoreError::ImageNotFound`].
    pub fn or_not_found(self, image_id: ImageId) -> StoreResult<usize> {
        match self {
            DeleteOutcome::Deleted { position, .. } => Ok(position),
            DeleteOutcome::NotFound => Err(StoreError::ImageNotFound(image_id)),
        }
    }
}

/// Result of deleting every record of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupDeleteOutcome {
    /// These image ids were removed, followed by exactly one rebuild.
    Deleted {
        group_id: GroupId,
        removed: Vec<ImageId>,
    },
    /// No record belongs to the group. Nothing changed.
    NotFound,
}

impl GroupDeleteOutcome {
    #[inline]
    pub fn is_deleted(&self) -> bool {
        matches!(self, GroupDeleteOutcome::Deleted { .. })
    }

    /// Number of removed records (0 when not found).
    pub fn removed_count(&self) -> usize {
        match self {
            GroupDeleteOutcome::Deleted { removed, .. } => removed.len(),
            GroupDeleteOutcome::NotFound => 0,
        }
    }

    /// Convert a negative result into [`StoreError::GroupNotFound`].
    pub fn or_not_found(self, group_id: GroupId) -> StoreResult<Vec<ImageId>> {
        match self {
            GroupDeleteOutcome::Deleted { removed, .. } => Ok(removed),
            GroupDeleteOutcome::NotFound => Err(StoreError::GroupNotFound(group_id)),
        }
    }
}

/// Per-id result of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutcome {
    /// `true` if the id was found and removed.
    pub results: BTreeMap<ImageId, bool>,
    /// Number of index rebuilds performed (0 or 1).
    pub rebuilds: u64,
}

impl BatchDeleteOutcome {
    pub fn deleted_count(&self) -> usize {
        self.results.values().filter(|&&deleted| deleted).count()
    }

    pub fn missing(&self) -> Vec<ImageId> {
        self.results
            .iter()
            .filter(|(_, &deleted)| !deleted)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Which fields an update touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated {
        image_id: ImageId,
        vector_changed: bool,
        path_changed: bool,
    },
    NotFound,
}

/// One page of a record search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub records: Vec<RecordSummary>,
}

/// Head and tail of the record sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSample {
    pub total: usize,
    pub first: Vec<RecordSummary>,
    pub last: Vec<RecordSummary>,
}

/// Read-only diagnostic over the parallel sequences and the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub num_vectors: usize,
    pub num_image_ids: usize,
    pub num_paths: usize,
    pub num_group_ids: usize,
    pub num_embeddings: usize,
    pub num_unique_image_ids: usize,
    pub num_unique_paths: usize,
    pub num_unique_group_ids: usize,
    pub num_nan_vectors: usize,
    pub min_vector_value: Option<f32>,
    pub max_vector_value: Option<f32>,
}

impl ConsistencyReport {
    /// All four sequences and the index agree on length.
    pub fn is_aligned(&self) -> bool {
        self.num_image_ids == self.num_paths
            && self.num_paths == self.num_group_ids
            && self.num_group_ids == self.num_embeddings
            && self.num_embeddings == self.num_vectors
    }

    pub fn duplicate_image_ids(&self) -> usize {
        self.num_image_ids - self.num_unique_image_ids
    }

    pub fn duplicate_paths(&self) -> usize {
        self.num_paths - self.num_unique_paths
    }

    /// Fail with [`StoreError::Inconsistent`] unless the store is aligned.
    pub fn ensure_aligned(&self) -> StoreResult<()> {
        if self.is_aligned() {
            return Ok(());
        }
        Err(StoreError::Inconsistent(format!(
            "ids={} paths={} groups={} embeddings={} index={}",
            self.num_image_ids,
            self.num_paths,
            self.num_group_ids,
            self.num_embeddings,
            self.num_vectors
        )))
    }
}

/// Raw lengths of the four parallel sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceLengths {
    pub image_ids: usize,
    pub paths: usize,
    pub group_ids: usize,
    pub embeddings: usize,
}

/// Boolean view of alignment and uniqueness, plus the raw counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub metadata_consistent: bool,
    pub index_consistent: bool,
    pub image_ids_unique: bool,
    pub paths_unique: bool,
    pub lengths: SequenceLengths,
    pub index_total: usize,
}

/// Size and activity summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_vectors: usize,
    pub unique_groups: usize,
    /// `count * dimension * 4`.
    pub index_size_bytes: usize,
    pub transaction_active: bool,
    pub generation: u64,
}

//! Core VectorStore implementation.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::index::FlatIpIndex;
use crate::types::{
    BatchDeleteOutcome, ConsistencyReport, DeleteOutcome, GroupDeleteOutcome, GroupId, ImageId,
    RecordPage, RecordSample, RecordSummary, SearchMatch, UpdateOutcome, VectorRecord,
};
use crate::vector::{normalized, normalized_batch};

/// Exact-search store with insert, delete, query and paired-file persistence.
///
/// # Invariants
///
/// After every successful mutation `image_ids`, `paths`, `group_ids`,
/// `vectors` and the index hold the same number of entries, and position `i`
/// in each refers to the same record. Uniqueness of ids and paths is the
/// caller's responsibility.
///
/// Any delete invalidates all positions: the index is rebuilt from the
/// surviving vectors in their surviving order.
pub struct VectorStore {
    pub(super) config: StoreConfig,
    pub(super) index: FlatIpIndex,
    pub(super) image_ids: Vec<ImageId>,
    pub(super) paths: Vec<String>,
    pub(super) group_ids: Vec<GroupId>,
    pub(super) vectors: Vec<Vec<f32>>,
    /// In-memory state differs from what was last saved or loaded.
    pub(super) dirty: bool,
    pub(super) rebuilds: u64,
    /// Bumped by every in-memory change, saved or not.
    pub(super) mutations: u64,
}

impl VectorStore {
    /// Open the store described by `config`.
    ///
    /// Loads the paired files when both exist, otherwise starts empty.
    /// Nothing is written.
    ///
    /// # Errors
    /// - `StoreError::InvalidConfig` if the config is invalid
    /// - Persistence errors if the files are unpaired, unreadable, corrupted
    ///   or were written with a different dimension
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let mut store = Self::empty(config)?;
        store.load()?;
        Ok(store)
    }

    /// Shorthand for [`VectorStore::open`] with default options.
    pub fn initialize(
        dimension: usize,
        structure_path: impl Into<std::path::PathBuf>,
        metadata_path: impl Into<std::path::PathBuf>,
    ) -> StoreResult<Self> {
        Self::open(StoreConfig::new(dimension, structure_path, metadata_path))
    }

    pub(super) fn empty(config: StoreConfig) -> StoreResult<Self> {
        let index = FlatIpIndex::new(config.dimension)?;
        Ok(Self {
            config,
            index,
            image_ids: Vec::new(),
            paths: Vec::new(),
            group_ids: Vec::new(),
            vectors: Vec::new(),
            dirty: false,
            rebuilds: 0,
            mutations: 0,
        })
    }

    // =========================================================================
    // INSERT
    // =========================================================================

    /// Normalize and append a batch of records.
    ///
    /// All four inputs must have the same length. Every vector is validated
    /// before anything is appended, so a failing batch leaves the store
    /// untouched. Duplicate ids and paths are not checked.
    ///
    /// # Returns
    /// Number of records appended.
    ///
    /// # Errors
    /// - `StoreError::LengthMismatch` if the inputs differ in length
    /// - `StoreError::DimensionMismatch` / `StoreError::InvalidVector` for a bad vector
    pub fn add_batch<V>(
        &mut self,
        vectors: &[V],
        image_ids: &[ImageId],
        paths: &[String],
        group_ids: &[GroupId],
    ) -> StoreResult<usize>
    where
        V: AsRef<[f32]> + Sync,
    {
        let count = vectors.len();
        check_len("image_ids", count, image_ids.len())?;
        check_len("paths", count, paths.len())?;
        check_len("group_ids", count, group_ids.len())?;

        if count == 0 {
            return Ok(0);
        }

        let dimension = self.dimension();
        let flat = normalized_batch(vectors, dimension)?;
        self.index.add(&flat)?;

        self.vectors
            .extend(flat.chunks_exact(dimension).map(<[f32]>::to_vec));
        self.image_ids.extend_from_slice(image_ids);
        self.paths.extend_from_slice(paths);
        self.group_ids.extend_from_slice(group_ids);
        self.mark_mutated();

        info!(added = count, total = self.index.ntotal(), "Added vectors to store");
        Ok(count)
    }

    // =========================================================================
    // QUERY
    // =========================================================================

    /// Top-`k` matches for one vector, best first.
    ///
    /// Scores are cosine similarities. Ties keep ascending position order.
    /// Returns fewer than `k` matches when the store holds fewer records and
    /// an empty list when it holds none.
    pub fn query(&self, vector: &[f32], k: usize) -> StoreResult<Vec<SearchMatch>> {
        let query = normalized(vector, self.dimension())?;
        let mut results = self.search_normalized(&query, k)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Top-`k` matches for several vectors, normalized together and searched
    /// in one index call. Output order follows input order.
    pub fn query_batch<V>(&self, vectors: &[V], k: usize) -> StoreResult<Vec<Vec<SearchMatch>>>
    where
        V: AsRef<[f32]> + Sync,
    {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let queries = normalized_batch(vectors, self.dimension())?;
        self.search_normalized(&queries, k)
    }

    fn search_normalized(&self, queries: &[f32], k: usize) -> StoreResult<Vec<Vec<SearchMatch>>> {
        let result = self.index.search(queries, k)?;

        let mut all = Vec::with_capacity(result.len());
        for query_idx in 0..result.len() {
            let matches: Vec<SearchMatch> = result
                .query_results(query_idx)
                .filter_map(|(position, score)| self.match_at(position, score))
                .collect();
            all.push(matches);
        }

        debug!(
            queries = all.len(),
            k,
            total = self.index.ntotal(),
            "Searched store"
        );
        Ok(all)
    }

    fn match_at(&self, position: usize, score: f32) -> Option<SearchMatch> {
        match (
            self.image_ids.get(position),
            self.paths.get(position),
            self.group_ids.get(position),
        ) {
            (Some(&image_id), Some(path), Some(&group_id)) => Some(SearchMatch {
                image_id,
                path: path.clone(),
                group_id,
                score,
                position,
            }),
            _ => {
                warn!(position, "Index hit has no metadata, skipping");
                None
            }
        }
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Remove the record holding `image_id` and rebuild the index.
    ///
    /// An absent id is reported as [`DeleteOutcome::NotFound`], not an error.
    pub fn delete_by_image_id(&mut self, image_id: ImageId) -> StoreResult<DeleteOutcome> {
        let Some(position) = self.position_of(image_id) else {
            debug!(%image_id, "Delete target not found");
            return Ok(DeleteOutcome::NotFound);
        };

        self.remove_positions(vec![position])?;
        info!(%image_id, position, "Deleted image from store");
        Ok(DeleteOutcome::Deleted { image_id, position })
    }

    /// Remove every record of `group_id` in one pass, then rebuild once.
    pub fn delete_by_group_id(&mut self, group_id: GroupId) -> StoreResult<GroupDeleteOutcome> {
        let positions: Vec<usize> = self
            .group_ids
            .iter()
            .enumerate()
            .filter(|(_, &g)| g == group_id)
            .map(|(position, _)| position)
            .collect();

        if positions.is_empty() {
            debug!(%group_id, "Group delete target not found");
            return Ok(GroupDeleteOutcome::NotFound);
        }

        let removed: Vec<ImageId> = positions
            .iter()
            .filter_map(|&p| self.image_ids.get(p).copied())
            .collect();
        self.remove_positions(positions)?;

        info!(%group_id, removed = removed.len(), "Deleted group from store");
        Ok(GroupDeleteOutcome::Deleted { group_id, removed })
    }

    /// Remove a set of ids with a single rebuild.
    ///
    /// Each id maps to `true` if it was found. Ids repeated in the input are
    /// reported once.
    pub fn delete_many(&mut self, image_ids: &[ImageId]) -> StoreResult<BatchDeleteOutcome> {
        let lookup: HashMap<ImageId, usize> = self
            .image_ids
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect();

        let mut outcome = BatchDeleteOutcome::default();
        let mut positions = Vec::new();
        for &id in image_ids {
            let position = lookup.get(&id).copied();
            if outcome.results.insert(id, position.is_some()).is_none() {
                positions.extend(position);
            }
        }

        if !positions.is_empty() {
            let before = self.rebuilds;
            self.remove_positions(positions)?;
            outcome.rebuilds = self.rebuilds - before;
        }

        info!(
            requested = image_ids.len(),
            deleted = outcome.deleted_count(),
            "Batch deleted images from store"
        );
        Ok(outcome)
    }

    /// Drop `positions` from every sequence, highest first so earlier
    /// removals never shift later ones, then rebuild the index once.
    pub(crate) fn remove_positions(&mut self, mut positions: Vec<usize>) -> StoreResult<()> {
        positions.sort_unstable_by(|a, b| b.cmp(a));
        positions.dedup();

        for position in positions {
            remove_at(&mut self.image_ids, position);
            remove_at(&mut self.paths, position);
            remove_at(&mut self.group_ids, position);
            remove_at(&mut self.vectors, position);
        }

        self.rebuild()
    }

    /// Replace the index with one built from `vectors`, in order.
    fn rebuild(&mut self) -> StoreResult<()> {
        self.index = FlatIpIndex::from_rows(self.dimension(), &self.vectors)?;
        self.rebuilds += 1;
        self.mark_mutated();
        info!(
            total = self.index.ntotal(),
            rebuilds = self.rebuilds,
            "Rebuilt index"
        );
        Ok(())
    }

    // =========================================================================
    // UPDATE / RESET
    // =========================================================================

    /// Replace the vector and/or path of an existing record.
    ///
    /// A new vector is validated before anything changes and costs one
    /// rebuild. A path equal to the current one is not a change.
    pub fn update_record(
        &mut self,
        image_id: ImageId,
        vector: Option<&[f32]>,
        path: Option<String>,
    ) -> StoreResult<UpdateOutcome> {
        let Some(position) = self.position_of(image_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        let replacement = vector
            .map(|v| normalized(v, self.dimension()))
            .transpose()?;

        let vector_changed = match replacement {
            Some(v) if position < self.vectors.len() => {
                self.vectors[position] = v;
                self.rebuild()?;
                true
            }
            Some(_) => {
                return Err(StoreError::Inconsistent(format!(
                    "image {} at position {} has no stored vector",
                    image_id, position
                )))
            }
            None => false,
        };

        let mut path_changed = false;
        if let Some(path) = path {
            if let Some(current) = self.paths.get_mut(position) {
                if *current != path {
                    *current = path;
                    path_changed = true;
                    self.mark_mutated();
                }
            }
        }

        info!(%image_id, vector_changed, path_changed, "Updated record");
        Ok(UpdateOutcome::Updated {
            image_id,
            vector_changed,
            path_changed,
        })
    }

    /// Empty the store and persist the empty state.
    pub fn reset(&mut self) -> StoreResult<()> {
        self.clear();
        self.save()?;
        info!("Reset store");
        Ok(())
    }

    /// Empty the store in memory only.
    pub fn clear(&mut self) {
        self.index.reset();
        self.image_ids.clear();
        self.paths.clear();
        self.group_ids.clear();
        self.vectors.clear();
        self.mark_mutated();
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Image ids of every record in `group_id`, in position order.
    pub fn get_ids_by_group(&self, group_id: GroupId) -> Vec<ImageId> {
        self.image_ids
            .iter()
            .zip(&self.group_ids)
            .filter(|(_, &g)| g == group_id)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn position_of(&self, image_id: ImageId) -> Option<usize> {
        self.image_ids.iter().position(|&id| id == image_id)
    }

    pub fn contains_image_id(&self, image_id: ImageId) -> bool {
        self.image_ids.contains(&image_id)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Full record for `image_id`, including its normalized vector.
    pub fn record_by_image_id(&self, image_id: ImageId) -> Option<VectorRecord> {
        let position = self.position_of(image_id)?;
        Some(VectorRecord {
            image_id,
            path: self.paths.get(position)?.clone(),
            group_id: *self.group_ids.get(position)?,
            vector: self.vectors.get(position)?.clone(),
        })
    }

    fn summary_at(&self, position: usize) -> Option<RecordSummary> {
        Some(RecordSummary {
            position,
            image_id: *self.image_ids.get(position)?,
            path: self.paths.get(position)?.clone(),
            group_id: *self.group_ids.get(position)?,
        })
    }

    fn record_count(&self) -> usize {
        self.image_ids
            .len()
            .min(self.paths.len())
            .min(self.group_ids.len())
    }

    /// Case-insensitive substring search over id, path and group id.
    ///
    /// Empty `text` matches every record. Pages are 1-based.
    ///
    /// # Errors
    /// `StoreError::InvalidArgument` if `page` or `page_size` is 0.
    pub fn search_records(
        &self,
        text: &str,
        page: usize,
        page_size: usize,
    ) -> StoreResult<RecordPage> {
        if page == 0 || page_size == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "page ({}) and page_size ({}) must be > 0",
                page, page_size
            )));
        }

        let needle = text.trim().to_lowercase();
        let matching: Vec<usize> = (0..self.record_count())
            .filter(|&p| {
                needle.is_empty()
                    || self.image_ids[p].to_string().contains(&needle)
                    || self.paths[p].to_lowercase().contains(&needle)
                    || self.group_ids[p].to_string().contains(&needle)
            })
            .collect();

        let records = matching
            .iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .filter_map(|&p| self.summary_at(p))
            .collect();

        Ok(RecordPage {
            total: matching.len(),
            page,
            page_size,
            records,
        })
    }

    /// First and last `n` records.
    pub fn sample_records(&self, n: usize) -> RecordSample {
        let total = self.record_count();
        let first = (0..n.min(total))
            .filter_map(|p| self.summary_at(p))
            .collect();
        let last = (total.saturating_sub(n)..total)
            .filter_map(|p| self.summary_at(p))
            .collect();
        RecordSample { total, first, last }
    }

    // =========================================================================
    // DIAGNOSTICS
    // =========================================================================

    /// Lengths, uniqueness and numeric health. Never mutates.
    pub fn check_consistency(&self) -> ConsistencyReport {
        let data = self.index.as_slice();
        let num_nan_vectors = data
            .chunks_exact(self.dimension())
            .filter(|row| row.iter().any(|x| x.is_nan()))
            .count();

        let finite = data.iter().copied().filter(|x| !x.is_nan());
        let min_vector_value = finite.clone().reduce(f32::min);
        let max_vector_value = finite.reduce(f32::max);

        ConsistencyReport {
            num_vectors: self.index.ntotal(),
            num_image_ids: self.image_ids.len(),
            num_paths: self.paths.len(),
            num_group_ids: self.group_ids.len(),
            num_embeddings: self.vectors.len(),
            num_unique_image_ids: self.image_ids.iter().collect::<HashSet<_>>().len(),
            num_unique_paths: self.paths.iter().collect::<HashSet<_>>().len(),
            num_unique_group_ids: self.group_ids.iter().collect::<HashSet<_>>().len(),
            num_nan_vectors,
            min_vector_value,
            max_vector_value,
        }
    }

    /// Number of vectors in the index.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.ntotal()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[inline]
    pub fn index(&self) -> &FlatIpIndex {
        &self.index
    }

    pub fn image_ids(&self) -> &[ImageId] {
        &self.image_ids
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn group_ids(&self) -> &[GroupId] {
        &self.group_ids
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn unique_group_count(&self) -> usize {
        self.group_ids.iter().collect::<HashSet<_>>().len()
    }

    /// Index rebuilds since this store was opened.
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// True if the in-memory state has not been persisted.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// In-memory changes since open, including ones already saved.
    ///
    /// Unlike [`VectorStore::is_dirty`], a `save` does not reset it, so two
    /// readings tell whether anything changed in between.
    #[inline]
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub(super) fn mark_mutated(&mut self) {
        self.dirty = true;
        self.mutations += 1;
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("dimension", &self.dimension())
            .field("ntotal", &self.index.ntotal())
            .field("records", &self.image_ids.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> StoreResult<()> {
    if expected != actual {
        return Err(StoreError::LengthMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// `Vec::remove` that tolerates sequences already shorter than the index.
#[inline]
fn remove_at<T>(items: &mut Vec<T>, position: usize) {
    if position < items.len() {
        items.remove(position);
    }
}

//! AtomicVectorStore and its transaction guard.

use std::cell::{RefCell, RefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::VectorStore;
use crate::types::{
    BatchDeleteOutcome, DeleteOutcome, GroupDeleteOutcome, GroupId, HealthReport, ImageId,
    SearchMatch, SequenceLengths, StoreStats, UpdateOutcome,
};

use super::backup::BackupSnapshot;
use super::file_ops::{write_pair_atomically, FileOps, StdFileOps};

const STRUCTURE_LABEL: &str = "structure";
const METADATA_LABEL: &str = "metadata";

/// Lock-protected, transactional handle to one [`VectorStore`].
///
/// Construct once per process and share it as `Arc<AtomicVectorStore>`.
/// Every mutation runs inside [`AtomicVectorStore::transaction`]; reads take
/// the same lock for their duration.
pub struct AtomicVectorStore {
    store: ReentrantMutex<RefCell<VectorStore>>,
    config: StoreConfig,
    file_ops: Arc<dyn FileOps>,
    transaction_active: AtomicBool,
    /// Bumped once per committed mutation.
    generation: AtomicU64,
}

impl AtomicVectorStore {
    /// Open the store and make sure both files exist on disk.
    ///
    /// When neither file exists yet, the empty state is written so that
    /// every later snapshot has a pair to restore.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::with_file_ops(config, Arc::new(StdFileOps))
    }

    /// [`AtomicVectorStore::open`] with a custom filesystem.
    pub fn with_file_ops(config: StoreConfig, file_ops: Arc<dyn FileOps>) -> StoreResult<Self> {
        let mut store = VectorStore::open(config.clone())?;

        if !config.structure_path.exists() && !config.metadata_path.exists() {
            persist(file_ops.as_ref(), &mut store)?;
            info!(
                structure = %config.structure_path.display(),
                "Initialized empty store on disk"
            );
        }

        Ok(Self {
            store: ReentrantMutex::new(RefCell::new(store)),
            config,
            file_ops,
            transaction_active: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Run `body` against the store with snapshot and rollback.
    ///
    /// 1. Take the lock. Fail with `NestedTransaction` if a transaction is
    ///    already active on it.
    /// 2. Snapshot both persisted files.
    /// 3. Run `body`. If it changed the store, whether or not it saved,
    ///    write the new state with [`write_pair_atomically`] and bump the
    ///    generation.
    /// 4. Discard the snapshot.
    ///
    /// If `body` or the save fails, the snapshot is restored, the store is
    /// reloaded from it and the original error is returned. If restoring
    /// fails too, the result is `RollbackFailed` wrapping the original error.
    /// A panic inside `body` restores the snapshot while unwinding.
    pub fn transaction<T, F>(&self, body: F) -> StoreResult<T>
    where
        F: FnOnce(&mut VectorStore) -> StoreResult<T>,
    {
        let guard = self.store.lock();
        if self.transaction_active.load(Ordering::Acquire) {
            warn!("Rejected nested transaction");
            return Err(StoreError::NestedTransaction);
        }
        let store = guard
            .try_borrow_mut()
            .map_err(|_| StoreError::StoreBusy)?;

        let snapshot = self.snapshot()?;

        self.transaction_active.store(true, Ordering::Release);
        let mut tx = TxGuard {
            store,
            snapshot: Some(snapshot),
            file_ops: self.file_ops.as_ref(),
            active: &self.transaction_active,
        };

        let mutations = tx.store.mutation_count();
        let value = match body(&mut tx.store) {
            Ok(value) => value,
            Err(err) => return Err(tx.abort(err)),
        };

        // A body that saved its own work is clean but still changed the store.
        if tx.store.mutation_count() != mutations || tx.store.is_dirty() {
            if let Err(err) = persist(self.file_ops.as_ref(), &mut tx.store) {
                return Err(tx.abort(err));
            }
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(generation, "Committed transaction");
        }

        tx.commit();
        Ok(value)
    }

    /// Normalize and append a batch in one transaction.
    pub fn atomic_add_batch<V>(
        &self,
        vectors: &[V],
        image_ids: &[ImageId],
        paths: &[String],
        group_ids: &[GroupId],
    ) -> StoreResult<usize>
    where
        V: AsRef<[f32]> + Sync,
    {
        self.transaction(|store| store.add_batch(vectors, image_ids, paths, group_ids))
    }

    pub fn atomic_delete_by_image_id(&self, image_id: ImageId) -> StoreResult<DeleteOutcome> {
        self.transaction(|store| store.delete_by_image_id(image_id))
    }

    /// Delete a set of ids in one transaction with one rebuild.
    pub fn atomic_batch_delete(&self, image_ids: &[ImageId]) -> StoreResult<BatchDeleteOutcome> {
        self.transaction(|store| store.delete_many(image_ids))
    }

    pub fn atomic_delete_by_group_id(&self, group_id: GroupId) -> StoreResult<GroupDeleteOutcome> {
        self.transaction(|store| store.delete_by_group_id(group_id))
    }

    pub fn atomic_update_record(
        &self,
        image_id: ImageId,
        vector: Option<&[f32]>,
        path: Option<String>,
    ) -> StoreResult<UpdateOutcome> {
        self.transaction(|store| store.update_record(image_id, vector, path))
    }

    /// Empty the store and persist the empty state.
    pub fn atomic_reset(&self) -> StoreResult<()> {
        self.transaction(|store| {
            store.clear();
            Ok(())
        })
    }

    /// Persist the current state via temp files and renames.
    ///
    /// Both files are snapshotted first. If any write or rename fails, the
    /// snapshot is restored, so the canonical pair is never left half
    /// replaced. The in-memory state is kept and stays dirty.
    ///
    /// # Errors
    /// - the write or rename error, after the files were restored
    /// - `StoreError::RollbackFailed` if restoring failed as well
    pub fn atomic_save(&self) -> StoreResult<()> {
        let guard = self.store.lock();
        let mut store = guard.try_borrow_mut().map_err(|_| StoreError::StoreBusy)?;
        let snapshot = self.snapshot()?;

        let saved = persist(self.file_ops.as_ref(), &mut store);
        let restored = match &saved {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Atomic save failed, restoring snapshot: {}", err);
                snapshot.restore(self.file_ops.as_ref())
            }
        };
        if let Err(e) = snapshot.discard() {
            warn!("Failed to discard backup snapshot: {}", e);
        }

        match (saved, restored) {
            (Ok(()), _) => Ok(()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(reason)) => {
                error!("Restore after failed save failed: {}", reason);
                Err(StoreError::RollbackFailed {
                    source: Box::new(err),
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Copy both persisted files aside.
    fn snapshot(&self) -> StoreResult<BackupSnapshot> {
        BackupSnapshot::create(
            self.file_ops.as_ref(),
            &[
                (STRUCTURE_LABEL, self.config.structure_path.as_path()),
                (METADATA_LABEL, self.config.metadata_path.as_path()),
            ],
            self.config.backup_dir.as_deref(),
        )
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Run a read-only closure under the lock.
    ///
    /// # Errors
    /// `StoreError::StoreBusy` if called from inside a transaction body on
    /// the same thread.
    pub fn with_store<R>(&self, f: impl FnOnce(&VectorStore) -> R) -> StoreResult<R> {
        let guard = self.store.lock();
        let store = guard.try_borrow().map_err(|_| StoreError::StoreBusy)?;
        Ok(f(&store))
    }

    pub fn query(&self, vector: &[f32], k: usize) -> StoreResult<Vec<SearchMatch>> {
        self.with_store(|store| store.query(vector, k))?
    }

    pub fn query_batch<V>(&self, vectors: &[V], k: usize) -> StoreResult<Vec<Vec<SearchMatch>>>
    where
        V: AsRef<[f32]> + Sync,
    {
        self.with_store(|store| store.query_batch(vectors, k))?
    }

    /// Alignment and uniqueness as booleans. Repairs nothing.
    pub fn health_check(&self) -> StoreResult<HealthReport> {
        let report = self.with_store(VectorStore::check_consistency)?;

        let metadata_consistent = report.num_image_ids == report.num_paths
            && report.num_paths == report.num_group_ids
            && report.num_group_ids == report.num_embeddings;
        let index_consistent = report.num_image_ids == report.num_vectors
            && report.num_embeddings == report.num_vectors;
        let image_ids_unique = report.duplicate_image_ids() == 0;
        let paths_unique = report.duplicate_paths() == 0;
        let healthy = metadata_consistent && index_consistent && image_ids_unique && paths_unique;

        if !healthy {
            warn!(
                metadata_consistent,
                index_consistent, image_ids_unique, paths_unique, "Store health check failed"
            );
        }

        Ok(HealthReport {
            healthy,
            metadata_consistent,
            index_consistent,
            image_ids_unique,
            paths_unique,
            lengths: SequenceLengths {
                image_ids: report.num_image_ids,
                paths: report.num_paths,
                group_ids: report.num_group_ids,
                embeddings: report.num_embeddings,
            },
            index_total: report.num_vectors,
        })
    }

    pub fn get_stats(&self) -> StoreResult<StoreStats> {
        let (total_vectors, unique_groups, dimension) = self.with_store(|store| {
            (store.len(), store.unique_group_count(), store.dimension())
        })?;

        Ok(StoreStats {
            total_vectors,
            unique_groups,
            index_size_bytes: total_vectors * dimension * std::mem::size_of::<f32>(),
            transaction_active: self.is_transaction_active(),
            generation: self.generation(),
        })
    }

    #[inline]
    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active.load(Ordering::Acquire)
    }

    /// Number of committed mutations since open.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl std::fmt::Debug for AtomicVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicVectorStore")
            .field("structure_path", &self.config.structure_path)
            .field("transaction_active", &self.is_transaction_active())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Encode both files and replace them atomically.
fn persist(ops: &dyn FileOps, store: &mut VectorStore) -> StoreResult<()> {
    let (structure, metadata) = store.encode()?;
    let config = store.config();
    write_pair_atomically(
        ops,
        &[
            (config.structure_path.as_path(), structure.as_slice()),
            (config.metadata_path.as_path(), metadata.as_slice()),
        ],
    )?;
    store.mark_clean();
    info!(total = store.len(), "Persisted store");
    Ok(())
}

/// Holds the borrowed store and the snapshot for one transaction.
///
/// Dropping it without `commit` or `abort` (a panic in the body) restores
/// the snapshot.
struct TxGuard<'a> {
    store: RefMut<'a, VectorStore>,
    snapshot: Option<BackupSnapshot>,
    file_ops: &'a dyn FileOps,
    active: &'a AtomicBool,
}

impl TxGuard<'_> {
    fn commit(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(e) = snapshot.discard() {
                warn!("Failed to discard backup snapshot: {}", e);
            }
        }
    }

    /// Roll back and return the error to hand to the caller.
    fn abort(mut self, err: StoreError) -> StoreError {
        let Some(snapshot) = self.snapshot.take() else {
            return err;
        };

        warn!("Transaction failed, rolling back: {}", err);
        let rollback = snapshot
            .restore(self.file_ops)
            .and_then(|()| self.store.load());
        if let Err(e) = snapshot.discard() {
            warn!("Failed to discard backup snapshot: {}", e);
        }

        match rollback {
            Ok(()) => err,
            Err(reason) => {
                error!("Rollback failed: {}", reason);
                StoreError::RollbackFailed {
                    source: Box::new(err),
                    reason: reason.to_string(),
                }
            }
        }
    }
}

impl Drop for TxGuard<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            error!("Transaction unwound without completing, restoring snapshot");
            if let Err(e) = snapshot.restore(self.file_ops) {
                error!("Restore during unwind failed: {}", e);
            } else if let Err(e) = self.store.load() {
                error!("Reload during unwind failed: {}", e);
            }
        }
        self.active.store(false, Ordering::Release);
    }
}

//! Paired-file persistence for VectorStore.
//!
//! The structure file holds the index, the metadata file holds the parallel
//! arrays. The two always travel together: a store with exactly one of them
//! on disk refuses to load.

use std::fs;
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::index::FlatIpIndex;

use super::core::VectorStore;
use super::metadata::MetadataFile;

impl VectorStore {
    /// Encode both files without touching disk.
    ///
    /// # Returns
    /// `(structure_bytes, metadata_bytes)`
    pub fn encode(&self) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        let structure = self.index.to_bytes();
        let metadata = MetadataFile {
            image_ids: self.image_ids.clone(),
            paths: self.paths.clone(),
            group_ids: self.group_ids.clone(),
            vectors: self
                .config
                .cache_vectors_in_metadata
                .then(|| self.vectors.clone()),
        }
        .to_bytes()?;
        Ok((structure, metadata))
    }

    /// Write both files in place.
    ///
    /// This is a plain overwrite. A crash between the two writes leaves a
    /// mismatched pair; use
    /// [`AtomicVectorStore::atomic_save`](crate::atomic::AtomicVectorStore::atomic_save)
    /// when that matters.
    pub fn save(&mut self) -> StoreResult<()> {
        let (structure, metadata) = self.encode()?;
        write_file(&self.config.structure_path, &structure)?;
        write_file(&self.config.metadata_path, &metadata)?;
        self.dirty = false;

        info!(
            total = self.index.ntotal(),
            structure = %self.config.structure_path.display(),
            metadata = %self.config.metadata_path.display(),
            "Saved store"
        );
        Ok(())
    }

    /// Replace in-memory state with the contents of the paired files.
    ///
    /// Both files absent yields an empty store. When the metadata carries no
    /// vectors, or a vector count different from the index, the vectors are
    /// read back from the index. Id, path and group length mismatches are
    /// loaded as they are and show up in [`VectorStore::check_consistency`].
    ///
    /// On error the in-memory state is left unchanged.
    pub fn load(&mut self) -> StoreResult<()> {
        let structure_path = self.config.structure_path.clone();
        let metadata_path = self.config.metadata_path.clone();

        match (structure_path.exists(), metadata_path.exists()) {
            (false, false) => {
                self.clear();
                self.dirty = false;
                info!(
                    structure = %structure_path.display(),
                    "No persisted store found, starting empty"
                );
                return Ok(());
            }
            (true, false) => {
                return Err(StoreError::UnpairedFiles {
                    present: structure_path,
                    missing: metadata_path,
                })
            }
            (false, true) => {
                return Err(StoreError::UnpairedFiles {
                    present: metadata_path,
                    missing: structure_path,
                })
            }
            (true, true) => {}
        }

        let index = FlatIpIndex::from_bytes(&read_file(&structure_path)?, self.config.dimension)?;
        let metadata = MetadataFile::from_bytes(&read_file(&metadata_path)?)?;

        let vectors = match metadata.vectors {
            Some(vectors) if vectors_match(&vectors, &index) => vectors,
            cached => {
                warn!(
                    cached = cached.as_ref().map(Vec::len),
                    ntotal = index.ntotal(),
                    "Vector metadata missing or out of step with index, reconstructing from index"
                );
                index.reconstruct_all()
            }
        };

        self.index = index;
        self.image_ids = metadata.image_ids;
        self.paths = metadata.paths;
        self.group_ids = metadata.group_ids;
        self.vectors = vectors;
        self.mutations += 1;
        self.dirty = false;

        let report = self.check_consistency();
        if !report.is_aligned() {
            warn!(
                ids = report.num_image_ids,
                paths = report.num_paths,
                groups = report.num_group_ids,
                ntotal = report.num_vectors,
                "Loaded store is not aligned"
            );
        }

        info!(
            total = self.index.ntotal(),
            structure = %structure_path.display(),
            "Loaded store"
        );
        Ok(())
    }

    /// Mark the in-memory state as persisted.
    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

fn vectors_match(vectors: &[Vec<f32>], index: &FlatIpIndex) -> bool {
    vectors.len() == index.ntotal() && vectors.iter().all(|v| v.len() == index.dimension())
}

fn read_file(path: &Path) -> StoreResult<Vec<u8>> {
    fs::read(path).map_err(|source| {
        error!("Failed to read {}: {}", path.display(), source);
        StoreError::Read {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn write_file(path: &Path, data: &[u8]) -> StoreResult<()> {
    let result = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
    .and_then(|()| fs::write(path, data));

    result.map_err(|source| {
        error!("Failed to write {}: {}", path.display(), source);
        StoreError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

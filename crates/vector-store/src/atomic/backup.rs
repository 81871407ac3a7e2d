//! Pre-transaction file snapshot.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::error::{StoreError, StoreResult};

use super::file_ops::FileOps;

const BACKUP_PREFIX: &str = "vector_store_backup_";

#[derive(Debug)]
struct BackupEntry {
    canonical: PathBuf,
    /// `None` if the canonical file did not exist when the snapshot was taken.
    copy: Option<PathBuf>,
}

/// Copies of the persisted files taken before a transaction body runs.
///
/// Lives in its own temporary directory, removed when the snapshot is
/// discarded or dropped. Restoring also deletes canonical files that did
/// not exist at snapshot time.
#[derive(Debug)]
pub struct BackupSnapshot {
    dir: TempDir,
    entries: Vec<BackupEntry>,
}

impl BackupSnapshot {
    /// Copy each `(label, path)` into a fresh backup directory.
    ///
    /// `label` names the copy inside the directory and must be unique.
    /// The directory is created under `backup_dir`, or the system temp
    /// directory when `None`.
    ///
    /// # Errors
    /// `StoreError::Backup` if the directory cannot be created or a copy fails.
    pub fn create(
        ops: &dyn FileOps,
        files: &[(&str, &Path)],
        backup_dir: Option<&Path>,
    ) -> StoreResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(BACKUP_PREFIX);
        let dir = match backup_dir {
            Some(parent) => std::fs::create_dir_all(parent).and_then(|()| builder.tempdir_in(parent)),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            error!("Failed to create backup directory: {}", e);
            StoreError::Backup(format!("failed to create backup directory: {}", e))
        })?;

        let mut entries = Vec::with_capacity(files.len());
        for (label, canonical) in files {
            let copy = if canonical.exists() {
                let target = dir.path().join(format!("{}.bak", label));
                ops.copy(canonical, &target).map_err(|e| {
                    error!("Failed to back up {}: {}", canonical.display(), e);
                    StoreError::Backup(format!(
                        "failed to copy '{}' into backup: {}",
                        canonical.display(),
                        e
                    ))
                })?;
                Some(target)
            } else {
                None
            };
            entries.push(BackupEntry {
                canonical: canonical.to_path_buf(),
                copy,
            });
        }

        debug!(dir = %dir.path().display(), files = entries.len(), "Created backup snapshot");
        Ok(Self { dir, entries })
    }

    /// Put every canonical file back the way it was at snapshot time.
    ///
    /// Attempts every file even if one fails, then reports the first failure.
    pub fn restore(&self, ops: &dyn FileOps) -> StoreResult<()> {
        let mut first_error = None;

        for entry in &self.entries {
            let result = match &entry.copy {
                Some(copy) => ops.copy(copy, &entry.canonical).map(|_| ()),
                None if entry.canonical.exists() => ops.remove_file(&entry.canonical),
                None => Ok(()),
            };

            if let Err(e) = result {
                error!("Failed to restore {}: {}", entry.canonical.display(), e);
                first_error.get_or_insert_with(|| {
                    StoreError::Backup(format!(
                        "failed to restore '{}': {}",
                        entry.canonical.display(),
                        e
                    ))
                });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(files = self.entries.len(), "Restored backup snapshot");
                Ok(())
            }
        }
    }

    /// Remove the backup directory.
    pub fn discard(self) -> StoreResult<()> {
        self.dir
            .close()
            .map_err(|e| StoreError::Backup(format!("failed to remove backup directory: {}", e)))
    }

    /// Backup directory on disk.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

//! Filesystem seam for persistence.
//!
//! Everything the transactional layer does to disk goes through
//! [`FileOps`], so tests can inject failures at a precise step.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{StoreError, StoreResult};

/// Minimal file operations used by atomic saves and backups.
pub trait FileOps: Send + Sync {
    /// Write `data` to `path`, creating parent directories.
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Rename `from` over `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Copy `from` to `to`, overwriting.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`FileOps`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// `<path>.tmp`, next to the canonical file so the rename stays on one filesystem.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write each `(path, bytes)` pair to its temp path, then rename every temp
/// file over its canonical path.
///
/// No canonical file is touched until every temp write has succeeded. On
/// failure, remaining temp files are removed. A rename failure after an
/// earlier rename succeeded leaves the pair mismatched; callers inside a
/// transaction roll back from their snapshot.
pub fn write_pair_atomically(ops: &dyn FileOps, files: &[(&Path, &[u8])]) -> StoreResult<()> {
    let temps: Vec<PathBuf> = files.iter().map(|(path, _)| temp_path(path)).collect();

    for (i, ((_, data), temp)) in files.iter().zip(&temps).enumerate() {
        if let Err(source) = ops.write(temp, data) {
            error!("Failed to write temp file {}: {}", temp.display(), source);
            discard_temps(ops, &temps[..=i]);
            return Err(StoreError::Write {
                path: temp.clone(),
                source,
            });
        }
    }

    for (i, ((path, _), temp)) in files.iter().zip(&temps).enumerate() {
        if let Err(source) = ops.rename(temp, path) {
            error!(
                "Failed to rename {} to {}: {}",
                temp.display(),
                path.display(),
                source
            );
            discard_temps(ops, &temps[i..]);
            return Err(StoreError::Rename {
                from: temp.clone(),
                to: path.to_path_buf(),
                source,
            });
        }
    }

    debug!(files = files.len(), "Atomically replaced files");
    Ok(())
}

fn discard_temps(ops: &dyn FileOps, temps: &[PathBuf]) {
    for temp in temps {
        match ops.remove_file(temp) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", temp.display(), e),
        }
    }
}

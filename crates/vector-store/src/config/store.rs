//! Store location and layout configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

// ============================================================================
// DEFAULT FUNCTIONS
// ============================================================================

fn default_dimension() -> usize {
    512
}

fn default_structure_path() -> PathBuf {
    PathBuf::from("index/vectors.index")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("index/vectors_meta.bin")
}

fn default_cache_vectors_in_metadata() -> bool {
    true
}

// ============================================================================
// STORE CONFIG
// ============================================================================

/// Where and how a store persists its two paired files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Fixed vector dimension. Every inserted and queried vector must match.
    /// Default: 512
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Serialized exact-search structure.
    #[serde(default = "default_structure_path")]
    pub structure_path: PathBuf,

    /// Parallel id/path/group arrays (and optionally the raw vectors).
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Directory for transaction backups. System temp dir when unset.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Also write the raw vectors into the metadata file.
    /// When false, vectors are always reconstructed from the structure on load.
    /// Default: true
    #[serde(default = "default_cache_vectors_in_metadata")]
    pub cache_vectors_in_metadata: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            structure_path: default_structure_path(),
            metadata_path: default_metadata_path(),
            backup_dir: None,
            cache_vectors_in_metadata: default_cache_vectors_in_metadata(),
        }
    }
}

impl StoreConfig {
    /// Config for the given dimension and file pair, other fields default.
    pub fn new(
        dimension: usize,
        structure_path: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dimension,
            structure_path: structure_path.into(),
            metadata_path: metadata_path.into(),
            ..Self::default()
        }
    }

    /// Builder-style backup directory override.
    #[must_use]
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Validate store configuration values.
    ///
    /// # Errors
    /// - `StoreError::InvalidConfig` if dimension is 0
    /// - `StoreError::InvalidConfig` if either path is empty
    /// - `StoreError::InvalidConfig` if both files share one path
    pub fn validate(&self) -> StoreResult<()> {
        if self.dimension == 0 {
            return Err(StoreError::InvalidConfig(
                "dimension must be > 0".to_string(),
            ));
        }

        if self.structure_path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "structure_path must not be empty".to_string(),
            ));
        }

        if self.metadata_path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "metadata_path must not be empty".to_string(),
            ));
        }

        if self.structure_path == self.metadata_path {
            return Err(StoreError::InvalidConfig(format!(
                "structure_path and metadata_path must differ (both '{}')",
                self.structure_path.display()
            )));
        }

        Ok(())
    }
}

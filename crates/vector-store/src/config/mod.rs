//! Root configuration for the vector store.
//!
//! # Loading Configuration
//!
//! ```rust,ignore
//! use vector_store::VectorStoreSettings;
//!
//! let settings = VectorStoreSettings::from_file("vector_store.toml")?
//!     .with_env_overrides();
//! settings.validate()?;
//! ```
//!
//! # TOML Structure
//!
//! ```toml
//! [store]
//! dimension = 512
//! structure_path = "index/vectors.index"
//! metadata_path = "index/vectors_meta.bin"
//!
//! [optimizer]
//! cache_ttl_secs = 300
//! cache_capacity = 100
//!
//! [service]
//! match_threshold = 0.5
//! ```
//!
//! Invalid config is an error; nothing silently falls back to defaults
//! except missing keys.

mod optimizer;
mod service;
mod store;


pub use optimizer::OptimizerConfig;
pub use service::ServiceConfig;
pub use store::StoreConfig;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Root configuration aggregating all sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub service: ServiceConfig,
}

impl VectorStoreSettings {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// - `StoreError::InvalidConfig` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&contents).map_err(|e| {
            StoreError::InvalidConfig(format!(
                "Failed to parse TOML in '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> StoreResult<Self> {
        toml::from_str(toml)
            .map_err(|e| StoreError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StoreError::InvalidConfig(format!("Failed to serialize to TOML: {}", e)))
    }

    /// Validate every section, returning the first error found.
    pub fn validate(&self) -> StoreResult<()> {
        self.store
            .validate()
            .map_err(|e| StoreError::InvalidConfig(format!("[store] {}", e)))?;

        self.optimizer
            .validate()
            .map_err(|e| StoreError::InvalidConfig(format!("[optimizer] {}", e)))?;

        self.service
            .validate()
            .map_err(|e| StoreError::InvalidConfig(format!("[service] {}", e)))?;

        Ok(())
    }

    /// Apply `VECTOR_STORE_*` environment overrides.
    ///
    /// | Variable | Config Path | Type |
    /// |----------|-------------|------|
    /// | `VECTOR_STORE_DIMENSION` | `store.dimension` | usize |
    /// | `VECTOR_STORE_STRUCTURE_PATH` | `store.structure_path` | path |
    /// | `VECTOR_STORE_METADATA_PATH` | `store.metadata_path` | path |
    /// | `VECTOR_STORE_BACKUP_DIR` | `store.backup_dir` | path |
    /// | `VECTOR_STORE_CACHE_ENABLED` | `optimizer.cache_enabled` | bool |
    /// | `VECTOR_STORE_CACHE_TTL_SECS` | `optimizer.cache_ttl_secs` | u64 |
    /// | `VECTOR_STORE_CACHE_CAPACITY` | `optimizer.cache_capacity` | usize |
    /// | `VECTOR_STORE_MATCH_THRESHOLD` | `service.match_threshold` | f32 |
    ///
    /// Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = env::var("VECTOR_STORE_DIMENSION") {
            if let Ok(n) = val.parse::<usize>() {
                self.store.dimension = n;
            }
        }
        if let Ok(val) = env::var("VECTOR_STORE_STRUCTURE_PATH") {
            self.store.structure_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("VECTOR_STORE_METADATA_PATH") {
            self.store.metadata_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("VECTOR_STORE_BACKUP_DIR") {
            self.store.backup_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("VECTOR_STORE_CACHE_ENABLED") {
            if let Ok(b) = val.parse::<bool>() {
                self.optimizer.cache_enabled = b;
            }
        }
        if let Ok(val) = env::var("VECTOR_STORE_CACHE_TTL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                self.optimizer.cache_ttl_secs = n;
            }
        }
        if let Ok(val) = env::var("VECTOR_STORE_CACHE_CAPACITY") {
            if let Ok(n) = val.parse::<usize>() {
                self.optimizer.cache_capacity = n;
            }
        }

        if let Ok(val) = env::var("VECTOR_STORE_MATCH_THRESHOLD") {
            if let Ok(t) = val.parse::<f32>() {
                self.service.match_threshold = t;
            }
        }

        self
    }
}

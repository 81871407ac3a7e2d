//! Error types for vector store operations.
//!
//! Every failure the store can produce is a variant of [`StoreError`]. Each
//! variant belongs to exactly one [`ErrorKind`], which is what an outer layer
//! should match on when it needs to decide how to report a failure.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{GroupId, ImageId};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input: wrong dimension, malformed vector, mismatched batch lengths.
    Validation,
    /// The targeted id or group does not exist.
    NotFound,
    /// Reading, writing, renaming or decoding a persisted file failed.
    Persistence,
    /// Parallel sequences and the index disagree.
    Consistency,
    /// A transaction was attempted while one is already active.
    Concurrency,
    /// An external extractor, registry or predictor failed.
    Collaborator,
}

/// Comprehensive error type for all store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    // ========== Validation Errors ==========
    /// Vector length differs from the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Parallel batch inputs have different lengths.
    #[error("Batch length mismatch: {field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Vector cannot be normalized (zero norm or non-finite component).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Caller tried to insert an id or path that is already stored.
    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument to a store operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Not Found Errors ==========
    /// No record holds this image id.
    #[error("Image not found: {0}")]
    ImageNotFound(ImageId),

    /// No record belongs to this group.
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    // ========== Persistence Errors ==========
    /// Reading a persisted file failed.
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a persisted or temporary file failed.
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Renaming a temporary file over its canonical path failed.
    #[error("Failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating or restoring a transaction backup failed.
    #[error("Backup failed: {0}")]
    Backup(String),

    /// Only one of the two paired files exists.
    #[error("Unpaired store files: '{present}' exists but '{missing}' does not")]
    UnpairedFiles { present: PathBuf, missing: PathBuf },

    /// Persisted index was written with a different dimension.
    #[error("Incompatible index file: configured dimension {expected}, file dimension {actual}")]
    IncompatibleIndex { expected: usize, actual: usize },

    /// Data corruption detected while decoding a persisted file.
    #[error("Corrupted data in {location}: {details}")]
    CorruptedData { location: String, details: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A transaction failed and restoring its snapshot failed as well.
    #[error("Rollback failed ({reason}) after: {source}")]
    RollbackFailed {
        #[source]
        source: Box<StoreError>,
        reason: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Consistency Errors ==========
    /// Parallel sequences or index count disagree.
    #[error("Store inconsistent: {0}")]
    Inconsistent(String),

    // ========== Concurrency Errors ==========
    /// A transaction is already active on this store.
    #[error("Nested transactions are not supported")]
    NestedTransaction,

    /// The store is held by an active transaction on the calling thread.
    #[error("Store is busy inside an active transaction")]
    StoreBusy,

    // ========== Collaborator Errors ==========
    /// An external collaborator failed.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },
}

impl StoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::DimensionMismatch { .. }
            | StoreError::LengthMismatch { .. }
            | StoreError::InvalidVector(_)
            | StoreError::Duplicate { .. }
            | StoreError::InvalidConfig(_)
            | StoreError::InvalidArgument(_) => ErrorKind::Validation,

            StoreError::ImageNotFound(_) | StoreError::GroupNotFound(_) => ErrorKind::NotFound,

            StoreError::Read { .. }
            | StoreError::Write { .. }
            | StoreError::Rename { .. }
            | StoreError::Backup(_)
            | StoreError::UnpairedFiles { .. }
            | StoreError::IncompatibleIndex { .. }
            | StoreError::CorruptedData { .. }
            | StoreError::Serialization(_)
            | StoreError::RollbackFailed { .. }
            | StoreError::Io(_) => ErrorKind::Persistence,

            StoreError::Inconsistent(_) => ErrorKind::Consistency,

            StoreError::NestedTransaction | StoreError::StoreBusy => ErrorKind::Concurrency,

            StoreError::Collaborator { .. } => ErrorKind::Collaborator,
        }
    }

    /// True if this error reports a missing id or group.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn corrupted(location: impl Into<String>, details: impl Into<String>) -> Self {
        StoreError::CorruptedData {
            location: location.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_dimension_mismatch() {
        let err = StoreError::DimensionMismatch {
            expected: 512,
            actual: 128,
        };
        let msg = err.to_string();
        assert!(msg.contains("512"));
        assert!(msg.contains("128"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_display_length_mismatch() {
        let err = StoreError::LengthMismatch {
            field: "paths",
            expected: 3,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("paths"));
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_error_display_image_not_found() {
        let err = StoreError::ImageNotFound(ImageId(999));
        assert!(err.to_string().contains("999"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_display_corrupted_data() {
        let err = StoreError::corrupted("metadata", "checksum mismatch");
        let msg = err.to_string();
        assert!(msg.contains("metadata"));
        assert!(msg.contains("checksum mismatch"));
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_rollback_failed_preserves_source() {
        use std::error::Error;

        let original = StoreError::InvalidArgument("boom".to_string());
        let err = StoreError::RollbackFailed {
            source: Box::new(original),
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("disk full"));
        assert!(err.source().is_some());
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(StoreError::NestedTransaction.kind(), ErrorKind::Concurrency);
        assert_eq!(StoreError::StoreBusy.kind(), ErrorKind::Concurrency);
        assert_eq!(
            StoreError::Inconsistent("ids=3 index=2".to_string()).kind(),
            ErrorKind::Consistency
        );
        assert_eq!(
            StoreError::GroupNotFound(GroupId(7)).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::Collaborator {
                collaborator: "extractor",
                message: "model not loaded".to_string(),
            }
            .kind(),
            ErrorKind::Collaborator
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
        assert_eq!(store_err.kind(), ErrorKind::Persistence);
    }
}

//! Transactional wrapper around [`VectorStore`](crate::store::VectorStore).
//!
//! # Thread Safety
//!
//! One `parking_lot::ReentrantMutex` guards the store. Queries and mutations
//! are mutually exclusive; there is no reader/writer split. A transaction
//! started while another is active on the same lock fails immediately with
//! [`StoreError::NestedTransaction`](crate::error::StoreError::NestedTransaction)
//! instead of deadlocking.
//!
//! # Durability
//!
//! Before a transaction body runs, both persisted files are copied into a
//! [`BackupSnapshot`]. On success the new state is written through
//! temp files and renames, then the snapshot is dropped. On any failure the
//! snapshot is copied back and the store is reloaded from it, so the files
//! end up byte-identical to their pre-transaction contents.

mod backup;
mod file_ops;
mod transaction;


pub use backup::BackupSnapshot;
pub use file_ops::{temp_path, write_pair_atomically, FileOps, StdFileOps};
pub use transaction::AtomicVectorStore;

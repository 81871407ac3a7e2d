//! Mutable store over the append-only index.
//!
//! [`VectorStore`] keeps four sequences aligned with index positions:
//! image ids, paths, group ids and the normalized vectors themselves. The
//! vector copy is what makes deletion possible: removing a record drops it
//! from every sequence and rebuilds the index from the surviving vectors.
//!
//! No locking happens here. Concurrent access goes through
//! [`AtomicVectorStore`](crate::atomic::AtomicVectorStore).

mod core;
mod metadata;
mod persistence;

#[cfg(test)]
mod tests;

pub use self::core::VectorStore;
pub use metadata::{MetadataFile, METADATA_MAGIC, METADATA_VERSION};

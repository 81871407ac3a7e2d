//! Metadata file format.
//!
//! Inside the [`codec`](crate::codec) envelope (magic `VSMD`, version 1) the
//! payload is the bincode encoding of [`MetadataFile`].

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::types::{GroupId, ImageId};

/// Magic bytes for the metadata file.
pub const METADATA_MAGIC: [u8; 4] = *b"VSMD";

/// Metadata file format version.
pub const METADATA_VERSION: u8 = 1;

/// Parallel arrays persisted next to the structure file.
///
/// `vectors` is a fallback copy of the index contents. It is `None` when the
/// store is configured not to cache vectors, in which case they are read
/// back from the structure on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub image_ids: Vec<ImageId>,
    pub paths: Vec<String>,
    pub group_ids: Vec<GroupId>,
    pub vectors: Option<Vec<Vec<f32>>>,
}

impl MetadataFile {
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let payload = bincode::serialize(self).map_err(|e| {
            error!("Metadata serialization failed: {}", e);
            StoreError::Serialization(format!("bincode serialization failed: {}", e))
        })?;
        Ok(codec::seal(METADATA_MAGIC, METADATA_VERSION, &payload))
    }

    pub fn from_bytes(data: &[u8]) -> StoreResult<Self> {
        const LOCATION: &str = "metadata file";

        let payload = codec::open(data, METADATA_MAGIC, METADATA_VERSION, LOCATION)?;
        bincode::deserialize(payload).map_err(|e| {
            StoreError::corrupted(LOCATION, format!("bincode deserialization failed: {}", e))
        })
    }
}

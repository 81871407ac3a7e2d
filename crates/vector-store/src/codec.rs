//! Checksummed file envelope shared by the structure and metadata files.
//!
//! Layout:
//! - Header: 4 magic bytes, 1 version byte
//! - Payload: format-specific bytes
//! - Footer: xxhash64 of all preceding bytes, little-endian

use crate::error::{StoreError, StoreResult};

/// magic(4) + version(1)
pub const HEADER_LEN: usize = 5;
/// xxhash64
pub const FOOTER_LEN: usize = 8;

/// Wrap `payload` in header and checksum footer.
pub fn seal(magic: [u8; 4], version: u8, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEADER_LEN + payload.len() + FOOTER_LEN);
    data.extend_from_slice(&magic);
    data.push(version);
    data.extend_from_slice(payload);

    let checksum = xxhash_rust::xxh64::xxh64(&data, 0);
    data.extend_from_slice(&checksum.to_le_bytes());
    data
}

/// Verify size, checksum, magic and version; return the payload.
///
/// `location` names the file kind in error messages.
pub fn open<'a>(
    data: &'a [u8],
    magic: [u8; 4],
    version: u8,
    location: &str,
) -> StoreResult<&'a [u8]> {
    if data.len() < HEADER_LEN + FOOTER_LEN {
        return Err(StoreError::corrupted(
            location,
            format!("file too small ({} bytes)", data.len()),
        ));
    }

    let checksum_offset = data.len() - FOOTER_LEN;
    let stored_checksum = u64::from_le_bytes(
        data[checksum_offset..]
            .try_into()
            .map_err(|_| StoreError::corrupted(location, "invalid checksum bytes"))?,
    );
    let computed_checksum = xxhash_rust::xxh64::xxh64(&data[..checksum_offset], 0);
    if stored_checksum != computed_checksum {
        return Err(StoreError::corrupted(
            location,
            format!(
                "checksum mismatch (stored={:#x}, computed={:#x})",
                stored_checksum, computed_checksum
            ),
        ));
    }

    if data[0..4] != magic {
        return Err(StoreError::corrupted(location, "invalid magic bytes"));
    }

    if data[4] != version {
        return Err(StoreError::corrupted(
            location,
            format!("unsupported version {} (expected {})", data[4], version),
        ));
    }

    Ok(&data[HEADER_LEN..checksum_offset])
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = *b"TEST";

    #[test]
    fn test_seal_then_open_returns_payload() {
        let sealed = seal(MAGIC, 3, b"payload");
        assert_eq!(sealed.len(), HEADER_LEN + 7 + FOOTER_LEN);
        let payload = open(&sealed, MAGIC, 3, "test").unwrap();
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_open_detects_flipped_byte() {
        let mut sealed = seal(MAGIC, 1, b"payload");
        sealed[6] ^= 0xFF;
        let err = open(&sealed, MAGIC, 1, "test").unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_open_rejects_wrong_magic_and_version() {
        let sealed = seal(MAGIC, 1, b"x");
        assert!(open(&sealed, *b"NOPE", 1, "test")
            .unwrap_err()
            .to_string()
            .contains("magic"));
        assert!(open(&sealed, MAGIC, 2, "test")
            .unwrap_err()
            .to_string()
            .contains("version"));
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let err = open(&[0x54, 0x45], MAGIC, 1, "test").unwrap_err();
        assert!(err.to_string().contains("too small"));
    }
}

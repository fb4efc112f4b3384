//! Checksum utilities for stored content

use crate::error::{FolioError, Result};
use sha2::{Digest, Sha256};

/// SHA-256 of an in-memory buffer, hex encoded
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compare a buffer against an expected digest (case-insensitive)
pub fn verify_sha256(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_bytes(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(FolioError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

//! Hashing - SHA-256 Content Digests
//!
//! Artifact bytes are hashed so logs and diagnostics can reference a render
//! without shipping the image around.

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

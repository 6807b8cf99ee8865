//! checksum.rs
//!
//! SHA-256 helpers.
//! - Content hash: lets a rebuild reuse a vector when re-extracted text is unchanged
//! - Artifact checksum: ties the persisted snapshot to the exact index bytes

use sha2::{Digest, Sha256};

/// Hash of a document's normalized content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"DOC\0");
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of a serialized artifact.
pub fn artifact_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("cats are great"), content_hash("cats are great"));
    }

    #[test]
    fn content_hash_changes_with_text() {
        assert_ne!(content_hash("cats are great"), content_hash("cats are lazy"));
    }

    #[test]
    fn artifact_checksum_is_domain_separated_from_content() {
        assert_ne!(artifact_checksum(b"x"), content_hash("x"));
        assert_eq!(artifact_checksum(b"x").len(), 64);
    }
}

//! Content hashing for deduplication.

use sha2::{Digest, Sha256};

/// SHA-256 of a document's content as lowercase hex.
pub fn compute_content_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_content_hash() {
        assert_eq!(
            compute_content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_whitespace_changes_hash() {
        assert_ne!(compute_content_hash(b"a b"), compute_content_hash(b"a  b"));
    }
}

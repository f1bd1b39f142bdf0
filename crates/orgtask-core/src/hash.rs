//! Content digests used as optimistic-concurrency version tokens.

use sha2::{Digest, Sha256};

/// Computes the version token of a fragment's text.
pub trait ContentHasher {
    /// Deterministic digest of `text`.
    fn hash(&self, text: &str) -> String;
}

/// Lowercase hex SHA-256, the digest the server and clients agree on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash(&self, text: &str) -> String {
        hash_text(text)
    }
}

impl<F> ContentHasher for F
where
    F: Fn(&str) -> String,
{
    fn hash(&self, text: &str) -> String {
        self(text)
    }
}

/// Lowercase hex SHA-256 of `text`.
#[must_use]
pub fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            hash_text(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(Sha256Hasher.hash("* Task\n"), hash_text("* Task\n"));
        assert_ne!(hash_text("a"), hash_text("b"));
    }

    #[test]
    fn test_closure_hasher() {
        let hasher = |text: &str| format!("len:{}", text.len());
        assert_eq!(hasher.hash("abc"), "len:3");
    }
}

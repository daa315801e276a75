//! Content hashing for the file hash cache.
//!
//! A cryptographic hash of a file's raw bytes, truncated to 128 bits —
//! collisions are negligible for this use and a 16-byte digest keeps cache
//! keys compact. Always computed from disk contents, never from git's
//! object id, so the cache stays valid across object-format quirks and
//! line-ending filters.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..16])
}

pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_identically() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }

    #[test]
    fn hash_is_32_hex_chars() {
        let digest = hash_bytes(b"anything");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

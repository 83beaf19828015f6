//! Content-based hashing for generated media

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// A SHA-256 content hash.
///
/// Recorded on every acquired item so exports and diagnostics can tell
/// whether two byte sources for the same item still agree.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Compute a hash from bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        Self(result.into())
    }

    /// Get the hash as a hex string
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Compute a hash from a file's contents
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(&data))
    }

    /// Get the hash as a prefixed hex string (e.g., "sha256:abcdef...")
    pub fn to_prefixed_hex(&self) -> String {
        format!("sha256:{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistent_hashing() {
        let h1 = ContentHash::from_bytes(b"frame");
        let h2 = ContentHash::from_bytes(b"frame");
        assert_eq!(h1, h2);
        assert_ne!(h1, ContentHash::from_bytes(b"other frame"));
    }

    #[test]
    fn test_prefixed_hex_shape() {
        let h = ContentHash::from_bytes(b"clip bytes");
        let prefixed = h.to_prefixed_hex();
        assert!(prefixed.starts_with("sha256:"));
        assert_eq!(prefixed.len(), "sha256:".len() + 64);
        assert!(prefixed.starts_with(&format!("sha256:{}", h)));
    }

    #[test]
    fn test_from_file_matches_bytes() {
        let dir = std::env::temp_dir().join(format!("splice_hash_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"clip bytes").unwrap();

        assert_eq!(ContentHash::from_file(&path).unwrap(), ContentHash::from_bytes(b"clip bytes"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Ephemeral in-process blob handles
//!
//! A blob URI gives low-latency access to bytes that were just acquired.
//! Handles are process-local and never survive a restart; every reader must
//! check liveness at read time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const BLOB_PREFIX: &str = "blob:splice/";

/// Whether `uri` is an ephemeral blob handle
pub fn is_blob_uri(uri: &str) -> bool {
    uri.starts_with(BLOB_PREFIX)
}

/// Process-local table of blob URIs and the bytes they reference
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes and return a fresh blob URI for them
    pub fn create(&self, bytes: Arc<[u8]>) -> String {
        let uri = format!("{}{}", BLOB_PREFIX, uuid::Uuid::new_v4());
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uri.clone(), bytes);
        uri
    }

    /// Bytes behind a live handle
    pub fn read(&self, uri: &str) -> Option<Arc<[u8]>> {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(uri)
            .cloned()
    }

    /// Release a handle. Returns false if it was not live.
    pub fn revoke(&self, uri: &str) -> bool {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(uri)
            .is_some()
    }

    pub fn is_live(&self, uri: &str) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_read_revoke() {
        let store = BlobStore::new();
        let uri = store.create(Arc::from(&b"pixels"[..]));
        assert!(is_blob_uri(&uri));
        assert!(store.is_live(&uri));
        assert_eq!(store.read(&uri).as_deref(), Some(&b"pixels"[..]));

        assert!(store.revoke(&uri));
        assert!(!store.is_live(&uri));
        assert!(store.read(&uri).is_none());
        assert!(!store.revoke(&uri));
    }

    #[test]
    fn test_handles_are_unique() {
        let store = BlobStore::new();
        let a = store.create(Arc::from(&b"x"[..]));
        let b = store.create(Arc::from(&b"x"[..]));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_non_blob_uris() {
        assert!(!is_blob_uri("https://cdn.example.com/a.png"));
        assert!(!is_blob_uri("file:///tmp/a.png"));
    }
}

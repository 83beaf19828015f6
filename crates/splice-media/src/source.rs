//! Byte-source resolution for a media item
//!
//! The same logical asset may be readable from durable storage, from an
//! in-process blob handle, or from its remote origin. Preview and export
//! both resolve through [`SourceResolver`] so the priority lives in one place.

use crate::blob::{is_blob_uri, BlobStore};
use crate::fetch::Fetcher;
use crate::types::MediaItem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where an item's bytes were read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Durable,
    Memory,
    Remote,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Durable => write!(f, "durable"),
            SourceKind::Memory => write!(f, "memory"),
            SourceKind::Remote => write!(f, "remote"),
        }
    }
}

/// Resolution order, most reliable first.
///
/// Durable storage wins over a live blob: blob handles can outlive the
/// bytes they were meant to mirror and silently read stale or empty data.
pub const SOURCE_PRIORITY: [SourceKind; 3] =
    [SourceKind::Durable, SourceKind::Memory, SourceKind::Remote];

/// Bytes read for an item, with the source that produced them
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    pub bytes: Arc<[u8]>,
    /// Sources tried before `kind` and why they were passed over
    pub skipped: Vec<SourceAttempt>,
}

/// Why one source was not used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: SourceKind,
    pub reason: String,
}

/// No source produced usable bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no readable source: {}", describe(.attempts))]
pub struct SourceError {
    pub attempts: Vec<SourceAttempt>,
}

fn describe(attempts: &[SourceAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.source, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Resolves item bytes in [`SOURCE_PRIORITY`] order
pub struct SourceResolver<'a> {
    blobs: &'a BlobStore,
    fetcher: &'a dyn Fetcher,
}

impl<'a> SourceResolver<'a> {
    pub fn new(blobs: &'a BlobStore, fetcher: &'a dyn Fetcher) -> Self {
        Self { blobs, fetcher }
    }

    /// Read the item's bytes from the highest-priority source that works
    pub fn resolve(&self, item: &MediaItem) -> Result<ResolvedSource, SourceError> {
        let mut attempts = Vec::new();

        for kind in SOURCE_PRIORITY {
            match self.read(kind, item) {
                Ok(bytes) => {
                    if !attempts.is_empty() {
                        tracing::debug!(item = %item.id, source = %kind, "fell back to lower-priority source");
                    }
                    return Ok(ResolvedSource {
                        kind,
                        bytes,
                        skipped: attempts,
                    });
                }
                Err(reason) => attempts.push(SourceAttempt {
                    source: kind,
                    reason,
                }),
            }
        }

        Err(SourceError { attempts })
    }

    fn read(&self, kind: SourceKind, item: &MediaItem) -> Result<Arc<[u8]>, String> {
        match kind {
            SourceKind::Durable => {
                let path = item
                    .confirmed_durable_path()
                    .ok_or_else(|| "no durable copy".to_string())?;
                let bytes = std::fs::read(path)
                    .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
                if bytes.is_empty() {
                    return Err(format!("{} is empty", path.display()));
                }
                Ok(Arc::from(bytes))
            }
            SourceKind::Memory => {
                if !is_blob_uri(&item.primary_uri) {
                    return Err("no in-memory handle".to_string());
                }
                let bytes = self
                    .blobs
                    .read(&item.primary_uri)
                    .ok_or_else(|| "in-memory handle was released".to_string())?;
                if bytes.is_empty() {
                    return Err("in-memory handle is empty".to_string());
                }
                Ok(bytes)
            }
            SourceKind::Remote => {
                let uri = remote_uri(item).ok_or_else(|| "no remote origin".to_string())?;
                let bytes = self.fetcher.fetch(uri).map_err(|e| e.to_string())?;
                if bytes.is_empty() {
                    return Err(format!("{} returned no data", uri));
                }
                Ok(Arc::from(bytes))
            }
        }
    }
}

fn remote_uri(item: &MediaItem) -> Option<&str> {
    item.origin_uri.as_deref().or_else(|| {
        let primary = item.primary_uri.as_str();
        (primary.starts_with("http://") || primary.starts_with("https://")).then_some(primary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;
    use splice_core::{Result, SpliceError};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFetcher {
        responses: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(uri.to_string());
            self.responses
                .get(uri)
                .cloned()
                .ok_or_else(|| SpliceError::TransportError(format!("GET {} returned HTTP 404", uri)))
        }
    }

    fn temp_file(content: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_source_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("item.png");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_durable_preferred_over_differing_memory_handle() {
        let blobs = BlobStore::new();
        let fetcher = FakeFetcher::default();
        let path = temp_file(b"durable bytes");

        let mut item = MediaItem::new("item.png", MediaType::Image, "");
        item.primary_uri = blobs.create(Arc::from(&b"stale memory bytes"[..]));
        item.durable_path = Some(path.clone());
        item.is_durable = true;

        let resolved = SourceResolver::new(&blobs, &fetcher).resolve(&item).unwrap();
        assert_eq!(resolved.kind, SourceKind::Durable);
        assert_eq!(&*resolved.bytes, b"durable bytes");
        assert!(resolved.skipped.is_empty());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_missing_durable_file_falls_back_to_memory() {
        let blobs = BlobStore::new();
        let fetcher = FakeFetcher::default();

        let mut item = MediaItem::new("item.png", MediaType::Image, "");
        item.primary_uri = blobs.create(Arc::from(&b"memory"[..]));
        item.durable_path = Some(PathBuf::from("/nonexistent/splice/item.png"));
        item.is_durable = true;

        let resolved = SourceResolver::new(&blobs, &fetcher).resolve(&item).unwrap();
        assert_eq!(resolved.kind, SourceKind::Memory);
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].source, SourceKind::Durable);
    }

    #[test]
    fn test_empty_memory_handle_falls_back_to_remote() {
        let blobs = BlobStore::new();
        let mut fetcher = FakeFetcher::default();
        fetcher
            .responses
            .insert("https://cdn.example.com/a.png".to_string(), b"remote".to_vec());

        let mut item = MediaItem::remote("a.png", MediaType::Image, "https://cdn.example.com/a.png");
        item.primary_uri = blobs.create(Arc::from(&b""[..]));

        let resolved = SourceResolver::new(&blobs, &fetcher).resolve(&item).unwrap();
        assert_eq!(resolved.kind, SourceKind::Remote);
        assert_eq!(&*resolved.bytes, b"remote");
    }

    #[test]
    fn test_all_sources_failing_lists_every_reason() {
        let blobs = BlobStore::new();
        let fetcher = FakeFetcher::default();
        let item = MediaItem::remote("gone.png", MediaType::Image, "https://cdn.example.com/gone.png");

        let err = SourceResolver::new(&blobs, &fetcher).resolve(&item).unwrap_err();
        let kinds: Vec<SourceKind> = err.attempts.iter().map(|a| a.source).collect();
        assert_eq!(kinds, SOURCE_PRIORITY.to_vec());
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_durable_flag_required() {
        let blobs = BlobStore::new();
        let fetcher = FakeFetcher::default();
        let path = temp_file(b"written but unconfirmed");

        let mut item = MediaItem::new("item.png", MediaType::Image, "blob:splice/none");
        item.durable_path = Some(path.clone());

        let err = SourceResolver::new(&blobs, &fetcher).resolve(&item).unwrap_err();
        assert_eq!(err.attempts[0].reason, "no durable copy");
        assert!(fetcher.calls.lock().unwrap().is_empty());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}

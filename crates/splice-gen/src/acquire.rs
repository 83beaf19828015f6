//! Acquisition pipeline
//!
//! Turns a remote result into a registered, durably stored media item:
//! fetch, write to project storage, mirror into a blob handle, insert.
//! The durable write is mandatory; there is no memory-only fallback.

use crate::transport::OutcomeMetadata;
use splice_core::{now_iso8601, now_millis, ContentHash, ProjectId, SpliceError, StorageFailure};
use splice_media::{DurableStorage, Fetcher, MediaItem, MediaRegistry, MediaType};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Source tag recorded on generated items
pub const GENERATED_SOURCE: &str = "ai-generated";

/// What to acquire and how to label it
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub project: ProjectId,
    pub remote_uri: String,
    /// Display name of the item
    pub desired_filename: String,
    pub media_type: MediaType,
    pub model_id: String,
    pub prompt: Option<String>,
    pub metadata: OutcomeMetadata,
    pub job_id: Option<String>,
}

/// Why an acquisition was abandoned
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquireError {
    #[error("download failed: {0}")]
    Fetch(String),

    #[error("download returned no data")]
    Empty,

    #[error("could not save to disk: {0}")]
    Storage(StorageFailure),

    #[error("media registry rejected the item: {0}")]
    Rejected(String),
}

impl AcquireError {
    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            AcquireError::Fetch(_) => "fetch",
            AcquireError::Empty => "empty",
            AcquireError::Storage(failure) => failure.reason(),
            AcquireError::Rejected(_) => "rejected",
        }
    }
}

impl From<AcquireError> for SpliceError {
    fn from(e: AcquireError) -> Self {
        match e {
            AcquireError::Storage(failure) => SpliceError::StorageError(failure),
            other => SpliceError::AcquisitionError(other.to_string()),
        }
    }
}

pub struct Acquirer {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn DurableStorage>,
    registry: Arc<MediaRegistry>,
}

impl Acquirer {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn DurableStorage>,
        registry: Arc<MediaRegistry>,
    ) -> Self {
        Self {
            fetcher,
            storage,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<MediaRegistry> {
        &self.registry
    }

    /// Fetch, persist and register one remote result.
    ///
    /// Any failure leaves the registry unchanged.
    pub fn acquire(&self, request: &AcquireRequest) -> Result<MediaItem, AcquireError> {
        let bytes = self
            .fetcher
            .fetch(&request.remote_uri)
            .map_err(|e| AcquireError::Fetch(e.to_string()))?;
        if bytes.is_empty() {
            return Err(AcquireError::Empty);
        }

        let file_name = unique_file_name(
            &request.model_id,
            &request.remote_uri,
            &request.desired_filename,
            request.media_type,
        );
        let path = self
            .storage
            .write_new(&request.project, &file_name, &bytes)
            .map_err(|failure| {
                tracing::warn!(
                    project = %request.project,
                    file = %file_name,
                    reason = failure.reason(),
                    "durable write failed"
                );
                AcquireError::Storage(failure)
            })?;

        let (width, height) = match (request.metadata.width, request.metadata.height) {
            (Some(w), Some(h)) => (Some(w), Some(h)),
            _ if request.media_type == MediaType::Image => match image_dimensions(&bytes) {
                Some((w, h)) => (Some(w), Some(h)),
                None => (request.metadata.width, request.metadata.height),
            },
            _ => (request.metadata.width, request.metadata.height),
        };
        let hash = ContentHash::from_bytes(&bytes);
        let byte_size = bytes.len() as u64;
        let blob_uri = self.registry.blobs().create(Arc::from(bytes));

        let mut item = MediaItem::new(&request.desired_filename, request.media_type, &blob_uri);
        item.origin_uri = Some(request.remote_uri.clone());
        item.durable_path = Some(path.clone());
        item.is_durable = true;
        item.byte_size = byte_size;
        item.width = width;
        item.height = height;
        item.duration = request.metadata.duration;
        item.metadata.model_id = Some(request.model_id.clone());
        item.metadata.prompt = request.prompt.clone();
        item.metadata.generated_at = Some(now_iso8601());
        item.metadata.source = Some(GENERATED_SOURCE.to_string());
        item.metadata.content_hash = Some(hash.to_prefixed_hex());
        item.metadata.frame_rate = request.metadata.frame_rate;
        item.metadata.job_id = request.job_id.clone();

        let id = match self.registry.insert(&request.project, item.clone()) {
            Ok(id) => id,
            Err(e) => {
                self.registry.blobs().revoke(&blob_uri);
                if let Err(remove_err) = self.storage.remove(&path) {
                    tracing::warn!(path = %path.display(), error = %remove_err, "failed to remove orphaned file");
                }
                return Err(AcquireError::Rejected(e.to_string()));
            }
        };

        tracing::info!(
            project = %request.project,
            item = %id,
            model = %request.model_id,
            bytes = byte_size,
            "acquired generated media"
        );

        // The registry's copy carries the assigned id and any unsaved flag.
        match self.registry.get(&request.project, &id) {
            Ok(Some(stored)) => Ok(stored),
            _ => {
                item.id = id;
                Ok(item)
            }
        }
    }
}

/// `<model>-<millis>-<suffix>.<ext>`, unique even for concurrent calls
pub fn unique_file_name(model_id: &str, remote_uri: &str, desired: &str, media_type: MediaType) -> String {
    let stem: String = model_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let stem = if stem.is_empty() { "media".to_string() } else { stem };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}.{}",
        stem,
        now_millis(),
        &suffix[..8],
        extension_for(remote_uri, desired, media_type)
    )
}

/// Extension of the remote path when it matches the media type, else the name's
pub(crate) fn extension_for(remote_uri: &str, desired: &str, media_type: MediaType) -> String {
    let from_uri = remote_uri
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .and_then(|last| Path::new(last).extension())
        .and_then(|e| e.to_str());
    let from_name = Path::new(desired).extension().and_then(|e| e.to_str());

    [from_uri, from_name]
        .into_iter()
        .flatten()
        .map(|e| e.to_ascii_lowercase())
        .find(|e| MediaType::from_extension(e) == Some(media_type))
        .unwrap_or_else(|| media_type.default_extension().to_string())
}

/// Width and height from the image header, if the format is recognized
fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use splice_core::Result;
    use splice_media::{BlobStore, IndexStore, ProjectStorage, TomlIndexStore};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[derive(Default)]
    pub(crate) struct MapFetcher {
        pub(crate) responses: HashMap<String, Vec<u8>>,
    }

    impl MapFetcher {
        pub(crate) fn with(mut self, uri: &str, bytes: &[u8]) -> Self {
            self.responses.insert(uri.to_string(), bytes.to_vec());
            self
        }
    }

    impl Fetcher for MapFetcher {
        fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
            self.responses
                .get(uri)
                .cloned()
                .ok_or_else(|| SpliceError::TransportError(format!("GET {} returned HTTP 404", uri)))
        }
    }

    /// Storage that always fails with the given classification
    pub(crate) struct FailingStorage(pub(crate) StorageFailure);

    impl DurableStorage for FailingStorage {
        fn write_new(&self, _project: &ProjectId, _file_name: &str, _bytes: &[u8]) -> std::result::Result<PathBuf, StorageFailure> {
            Err(self.0.clone())
        }

        fn remove(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_acquire_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn registry_at(dir: &Path) -> Arc<MediaRegistry> {
        let index: Arc<dyn IndexStore> = Arc::new(TomlIndexStore::new(dir));
        Arc::new(MediaRegistry::new(index, Arc::new(BlobStore::new())))
    }

    fn request(uri: &str, media_type: MediaType) -> AcquireRequest {
        AcquireRequest {
            project: ProjectId::new("demo").unwrap(),
            remote_uri: uri.to_string(),
            desired_filename: "clip.mp4".to_string(),
            media_type,
            model_id: "veo3-fast".to_string(),
            prompt: Some("waves".to_string()),
            metadata: OutcomeMetadata {
                duration: Some(8.0),
                ..Default::default()
            },
            job_id: Some("j-1".to_string()),
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_acquire_persists_and_registers() {
        let dir = temp_dir();
        let registry = registry_at(&dir);
        let fetcher = MapFetcher::default().with("https://cdn.example.com/out.mp4?sig=1", b"video bytes");
        let acquirer = Acquirer::new(Arc::new(fetcher), Arc::new(ProjectStorage::new(&dir)), registry.clone());

        let req = request("https://cdn.example.com/out.mp4?sig=1", MediaType::Video);
        let item = acquirer.acquire(&req).unwrap();

        assert!(item.is_durable);
        assert!(!item.unsaved);
        assert!(registry.blobs().is_live(&item.primary_uri));
        assert_eq!(item.origin_uri.as_deref(), Some("https://cdn.example.com/out.mp4?sig=1"));
        assert_eq!(item.byte_size, 11);
        assert_eq!(item.duration, Some(8.0));
        assert_eq!(item.metadata.job_id.as_deref(), Some("j-1"));
        assert!(item.metadata.content_hash.as_deref().unwrap().starts_with("sha256:"));

        let path = item.durable_path.clone().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"video bytes");
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("veo3-fast-"));
        assert!(file_name.ends_with(".mp4"));

        let listed = registry.list(&req.project).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, item.id);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_permission_failure_registers_nothing() {
        let dir = temp_dir();
        let registry = registry_at(&dir);
        let fetcher = MapFetcher::default().with("https://cdn.example.com/a.mp4", b"bytes");
        let acquirer = Acquirer::new(
            Arc::new(fetcher),
            Arc::new(FailingStorage(StorageFailure::PermissionDenied)),
            registry.clone(),
        );

        let req = request("https://cdn.example.com/a.mp4", MediaType::Video);
        let err = acquirer.acquire(&req).unwrap_err();
        assert_eq!(err.reason(), "permission");
        assert!(registry.list(&req.project).unwrap().is_empty());
        assert!(registry.blobs().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_space_and_unknown_reasons() {
        assert_eq!(AcquireError::Storage(StorageFailure::InsufficientSpace).reason(), "space");
        assert_eq!(
            AcquireError::Storage(StorageFailure::Unknown("EIO".to_string())).reason(),
            "unknown"
        );
    }

    #[test]
    fn test_fetch_failure_and_empty_body() {
        let dir = temp_dir();
        let registry = registry_at(&dir);
        let fetcher = MapFetcher::default().with("https://cdn.example.com/empty.mp4", b"");
        let acquirer = Acquirer::new(Arc::new(fetcher), Arc::new(ProjectStorage::new(&dir)), registry.clone());

        let missing = acquirer
            .acquire(&request("https://cdn.example.com/missing.mp4", MediaType::Video))
            .unwrap_err();
        assert_eq!(missing.reason(), "fetch");

        let empty = acquirer
            .acquire(&request("https://cdn.example.com/empty.mp4", MediaType::Video))
            .unwrap_err();
        assert_eq!(empty, AcquireError::Empty);
        assert!(registry.list(&ProjectId::new("demo").unwrap()).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_image_dimensions_read_from_bytes() {
        let dir = temp_dir();
        let registry = registry_at(&dir);
        let fetcher = MapFetcher::default().with("https://cdn.example.com/gen", &png_bytes(64, 32));
        let acquirer = Acquirer::new(Arc::new(fetcher), Arc::new(ProjectStorage::new(&dir)), registry);

        let mut req = request("https://cdn.example.com/gen", MediaType::Image);
        req.desired_filename = "poster.png".to_string();
        req.metadata = OutcomeMetadata::default();
        let item = acquirer.acquire(&req).unwrap();

        assert_eq!(item.width, Some(64));
        assert_eq!(item.height, Some(32));
        assert!(item.durable_path.unwrap().to_str().unwrap().ends_with(".png"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unique_file_names() {
        let a = unique_file_name("veo3/fast", "https://x/y.mp4", "clip", MediaType::Video);
        let b = unique_file_name("veo3/fast", "https://x/y.mp4", "clip", MediaType::Video);
        assert_ne!(a, b);
        assert!(a.starts_with("veo3-fast-"));
        assert!(a.ends_with(".mp4"));

        let odd = unique_file_name("m", "https://x/result.bin", "out", MediaType::Image);
        assert!(odd.ends_with(".png"));
    }
}

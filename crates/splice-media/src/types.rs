//! Media record definitions

use serde::{Deserialize, Serialize};
use splice_core::MediaId;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kinds of media the registry can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    /// File extension used when a name carries none
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaType::Image => "png",
            MediaType::Video => "mp4",
            MediaType::Audio => "mp3",
        }
    }

    /// Guess the media type from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "webp" | "gif" | "bmp" => Some(MediaType::Image),
            "mp4" | "mov" | "webm" | "mkv" => Some(MediaType::Video),
            "mp3" | "wav" | "ogg" | "flac" | "m4a" => Some(MediaType::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Image => write!(f, "image"),
            MediaType::Video => write!(f, "video"),
            MediaType::Audio => write!(f, "audio"),
        }
    }
}

/// Provenance recorded alongside an item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Generation model that produced the item
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// RFC 3339 timestamp of the generation
    #[serde(default)]
    pub generated_at: Option<String>,
    /// Free-form source tag (e.g. "ai-generated", "import")
    #[serde(default)]
    pub source: Option<String>,
    /// Content hash of the acquired bytes (sha256:...)
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    /// Remote job id when the service answered with a job handle
    #[serde(default)]
    pub job_id: Option<String>,
}

/// The registry's unit of record.
///
/// `primary_uri` is the only address consumers should render or play. It
/// may be an ephemeral `blob:` URI, a `file://` URI or the remote origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub primary_uri: String,
    /// Remote URL the asset was produced from, kept after local persistence
    #[serde(default)]
    pub origin_uri: Option<String>,
    #[serde(default)]
    pub durable_path: Option<PathBuf>,
    /// True only once the bytes were written to durable storage
    #[serde(default)]
    pub is_durable: bool,
    #[serde(default)]
    pub byte_size: u64,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub metadata: MediaMetadata,
    /// Set by the registry when the item is not yet in the durable index
    #[serde(default)]
    pub unsaved: bool,
    #[serde(default)]
    pub save_error: Option<String>,
    /// RFC 3339 timestamp assigned by the registry on insert
    #[serde(default)]
    pub added_at: Option<String>,
}

impl MediaItem {
    /// A candidate item addressed by `primary_uri`; the registry assigns the real id
    pub fn new(name: &str, media_type: MediaType, primary_uri: &str) -> Self {
        Self {
            id: MediaId::new(),
            name: name.to_string(),
            media_type,
            primary_uri: primary_uri.to_string(),
            origin_uri: None,
            durable_path: None,
            is_durable: false,
            byte_size: 0,
            width: None,
            height: None,
            duration: None,
            metadata: MediaMetadata::default(),
            unsaved: false,
            save_error: None,
            added_at: None,
        }
    }

    /// A candidate that only exists at a remote URL
    pub fn remote(name: &str, media_type: MediaType, origin_uri: &str) -> Self {
        let mut item = Self::new(name, media_type, origin_uri);
        item.origin_uri = Some(origin_uri.to_string());
        item
    }

    /// Durable path, but only when the durable write is confirmed
    pub fn confirmed_durable_path(&self) -> Option<&Path> {
        if self.is_durable {
            self.durable_path.as_deref()
        } else {
            None
        }
    }

    /// File extension from the durable path or name, falling back to the type default
    pub fn extension(&self) -> String {
        self.durable_path
            .as_deref()
            .and_then(|p| p.extension())
            .or_else(|| Path::new(&self.name).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| self.media_type.default_extension().to_string())
    }
}

/// `file://` URI for a local path
pub fn file_uri(path: &Path) -> String {
    let display = path.to_string_lossy().replace('\\', "/");
    if display.starts_with('/') {
        format!("file://{}", display)
    } else {
        format!("file:///{}", display)
    }
}

/// TOML shape of one item inside the durable index
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct IndexFile {
    #[serde(default)]
    pub items: std::collections::BTreeMap<String, MediaItem>,
}

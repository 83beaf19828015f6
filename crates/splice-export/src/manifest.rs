//! Export manifest
//!
//! Records, for every packed item, the archive entry it landed in and the
//! byte source it was read from, plus every item that had to be skipped.

use serde::{Deserialize, Serialize};
use splice_core::{now_iso8601, Result};
use splice_media::{MediaType, SourceAttempt, SourceKind};

/// One item written to the archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    /// Entry name inside the archive
    pub file: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub source: SourceKind,
    pub byte_size: u64,
    /// Hash of the bytes actually packed (sha256:...)
    pub content_hash: String,
    /// Higher-priority sources that were passed over
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<SourceAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// An item that could not be packed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub project: String,
    pub created_at: String,
    pub entries: Vec<ManifestEntry>,
    #[serde(default)]
    pub skipped: Vec<SkippedItem>,
}

impl ExportManifest {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            created_at: now_iso8601(),
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Source of each packed entry, in archive order
    pub fn sources(&self) -> Vec<SourceKind> {
        self.entries.iter().map(|e| e.source).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

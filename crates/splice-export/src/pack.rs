//! Packaging engine

use crate::manifest::{ExportManifest, ManifestEntry, SkippedItem};
use splice_core::{ContentHash, MediaId, ProjectId, Result, SpliceError};
use splice_media::{Fetcher, MediaItem, MediaRegistry, SourceResolver};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive entry holding the manifest
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// A packed archive and its manifest
#[derive(Debug, Clone)]
pub struct ExportArchive {
    pub bytes: Vec<u8>,
    pub manifest: ExportManifest,
}

/// Packs registry items into a deflate-compressed zip
pub struct PackagingEngine {
    registry: Arc<MediaRegistry>,
    fetcher: Arc<dyn Fetcher>,
}

impl PackagingEngine {
    pub fn new(registry: Arc<MediaRegistry>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { registry, fetcher }
    }

    /// Pack `ids` (every item of the project when empty). Repeated ids are
    /// packed once, at their first position.
    ///
    /// Items that cannot be read from any source are recorded in the
    /// manifest and skipped; only archive-level failures are errors.
    pub fn pack(&self, project: &ProjectId, ids: &[MediaId]) -> Result<ExportArchive> {
        let snapshot = self.registry.snapshot(project)?;
        let ids: Vec<MediaId> = if ids.is_empty() {
            snapshot.iter().map(|item| item.id.clone()).collect()
        } else {
            let mut seen = HashSet::new();
            ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
        };
        if ids.is_empty() {
            return Err(SpliceError::ExportError(format!(
                "Project '{}' has no media to export",
                project
            )));
        }

        let resolver = SourceResolver::new(self.registry.blobs(), self.fetcher.as_ref());
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut names = EntryNames::default();
        let mut manifest = ExportManifest::new(project.as_str());

        for id in &ids {
            let Some(item) = snapshot.get(id) else {
                manifest.skipped.push(SkippedItem {
                    id: id.to_string(),
                    name: None,
                    reason: "not found in project".to_string(),
                });
                continue;
            };

            let resolved = match resolver.resolve(item) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(project = %project, item = %id, error = %e, "skipping item in export");
                    manifest.skipped.push(SkippedItem {
                        id: id.to_string(),
                        name: Some(item.name.clone()),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let file = names.claim(&entry_name(item));
            writer.start_file(file.clone(), options).map_err(zip_error)?;
            writer.write_all(&resolved.bytes)?;

            manifest.entries.push(ManifestEntry {
                id: id.to_string(),
                name: item.name.clone(),
                file,
                media_type: item.media_type,
                source: resolved.kind,
                byte_size: resolved.bytes.len() as u64,
                content_hash: ContentHash::from_bytes(&resolved.bytes).to_prefixed_hex(),
                fallbacks: resolved.skipped,
                model_id: item.metadata.model_id.clone(),
                prompt: item.metadata.prompt.clone(),
            });
        }

        writer.start_file(MANIFEST_ENTRY, options).map_err(zip_error)?;
        writer.write_all(manifest.to_json()?.as_bytes())?;
        let bytes = writer.finish().map_err(zip_error)?.into_inner();

        tracing::info!(
            project = %project,
            packed = manifest.entries.len(),
            skipped = manifest.skipped.len(),
            bytes = bytes.len(),
            "export archive built"
        );
        Ok(ExportArchive { bytes, manifest })
    }

    /// Pack and write the archive to `path`, replacing it atomically
    pub fn pack_to_file(&self, project: &ProjectId, ids: &[MediaId], path: &Path) -> Result<ExportManifest> {
        let archive = self.pack(project, ids)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SpliceError::ExportError(format!("Invalid output path {}", path.display())))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let staging = dir.join(format!(".{}.partial", file_name));
        std::fs::write(&staging, &archive.bytes)
            .and_then(|_| std::fs::rename(&staging, path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&staging);
                SpliceError::ExportError(format!("Failed to write {}: {}", path.display(), e))
            })?;
        Ok(archive.manifest)
    }
}

fn zip_error(e: zip::result::ZipError) -> SpliceError {
    SpliceError::ExportError(format!("Failed to build archive: {}", e))
}

/// Item name made safe for an archive entry, with an extension
fn entry_name(item: &MediaItem) -> String {
    let base: String = item
        .name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let base = base.trim().trim_start_matches('.');
    let base = if base.is_empty() { item.id.as_str() } else { base };

    if Path::new(base).extension().is_some() {
        base.to_string()
    } else {
        format!("{}.{}", base, item.extension())
    }
}

/// Hands out unique entry names: `clip.mp4`, `clip-2.mp4`, ...
#[derive(Default)]
struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, wanted: &str) -> String {
        if self.taken.is_empty() {
            self.taken.insert(MANIFEST_ENTRY.to_string());
        }
        if self.taken.insert(wanted.to_lowercase()) {
            return wanted.to_string();
        }

        let path = Path::new(wanted);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(wanted);
        let ext = path.extension().and_then(|e| e.to_str());
        (2..)
            .map(|n| match ext {
                Some(ext) => format!("{}-{}.{}", stem, n, ext),
                None => format!("{}-{}", stem, n),
            })
            .find(|candidate| self.taken.insert(candidate.to_lowercase()))
            .unwrap_or_else(|| wanted.to_string())
    }
}

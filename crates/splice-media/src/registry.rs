//! Canonical media registry
//!
//! Every mutation for a project goes through that project's writer lock, so
//! two acquisitions finishing at once cannot interleave a partial update.
//! Readers clone an `Arc` to an immutable snapshot and never wait on writers
//! doing I/O.
//!
//! Insertion is optimistic: the item becomes visible before the durable
//! index write. If that write fails the item stays visible, flagged
//! `unsaved`, until [`MediaRegistry::retry_save`] succeeds. It is never
//! rolled back.

use crate::blob::{is_blob_uri, BlobStore};
use crate::fetch::Fetcher;
use crate::index::IndexStore;
use crate::source::{ResolvedSource, SourceResolver};
use crate::types::{file_uri, MediaItem, MediaType};
use splice_core::{now_iso8601, ContentHash, MediaId, ProjectId, Result, SpliceError};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Immutable view of one project's items
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    items: HashMap<MediaId, MediaItem>,
    order: Vec<MediaId>,
}

impl ProjectSnapshot {
    fn from_items(items: Vec<MediaItem>) -> Self {
        let mut snapshot = Self::default();
        for item in items {
            snapshot.upsert(item);
        }
        snapshot
    }

    pub fn get(&self, id: &MediaId) -> Option<&MediaItem> {
        self.items.get(id)
    }

    /// Items in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn upsert(&mut self, item: MediaItem) {
        if !self.items.contains_key(&item.id) {
            self.order.push(item.id.clone());
        }
        self.items.insert(item.id.clone(), item);
    }

    fn remove(&mut self, id: &MediaId) -> Option<MediaItem> {
        let removed = self.items.remove(id)?;
        self.order.retain(|o| o != id);
        Some(removed)
    }

    fn to_vec(&self) -> Vec<MediaItem> {
        self.iter().cloned().collect()
    }
}

/// Result of [`MediaRegistry::retry_save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The item was unsaved and is now in the durable index
    Saved,
    /// The item was already indexed; nothing was written
    AlreadySaved,
}

struct ProjectSlot {
    writer: Mutex<()>,
    snapshot: RwLock<Arc<ProjectSnapshot>>,
}

impl ProjectSlot {
    fn current(&self) -> Arc<ProjectSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, snapshot: ProjectSnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }
}

/// Registry of media items, scoped per project
pub struct MediaRegistry {
    index: Arc<dyn IndexStore>,
    blobs: Arc<BlobStore>,
    projects: RwLock<HashMap<ProjectId, Arc<ProjectSlot>>>,
}

impl MediaRegistry {
    pub fn new(index: Arc<dyn IndexStore>, blobs: Arc<BlobStore>) -> Self {
        Self {
            index,
            blobs,
            projects: RwLock::new(HashMap::new()),
        }
    }

    /// Blob handles owned by items in this registry
    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    /// Accept a candidate item and return its assigned id.
    ///
    /// The candidate is validated first and rejected as a whole if invalid.
    /// A durable-index failure does not fail the insert; the item is kept
    /// and flagged `unsaved`.
    pub fn insert(&self, project: &ProjectId, mut item: MediaItem) -> Result<MediaId> {
        validate_candidate(&item)?;
        let slot = self.slot(project)?;
        let _writer = slot.writer.lock().unwrap_or_else(|e| e.into_inner());

        let id = MediaId::new();
        item.id = id.clone();
        item.unsaved = false;
        item.save_error = None;
        item.added_at = Some(now_iso8601());

        let mut next = (*slot.current()).clone();
        next.upsert(item);
        slot.publish(next.clone());

        match self.index.save(project, &next.to_vec()) {
            Ok(()) => {
                tracing::debug!(project = %project, item = %id, "item indexed");
                if next.iter().any(|entry| entry.unsaved) {
                    clear_unsaved(&mut next);
                    slot.publish(next);
                }
            }
            Err(e) => {
                tracing::warn!(project = %project, item = %id, error = %e, "durable index write failed; item kept as unsaved");
                if let Some(entry) = next.items.get_mut(&id) {
                    entry.unsaved = true;
                    entry.save_error = Some(e.to_string());
                }
                slot.publish(next);
            }
        }

        Ok(id)
    }

    /// Look up an item
    pub fn get(&self, project: &ProjectId, id: &MediaId) -> Result<Option<MediaItem>> {
        Ok(self.slot(project)?.current().get(id).cloned())
    }

    /// Current immutable snapshot of a project
    pub fn snapshot(&self, project: &ProjectId) -> Result<Arc<ProjectSnapshot>> {
        Ok(self.slot(project)?.current())
    }

    /// All items of a project in insertion order
    pub fn list(&self, project: &ProjectId) -> Result<Vec<MediaItem>> {
        Ok(self.slot(project)?.current().to_vec())
    }

    /// Items that are visible but not yet in the durable index
    pub fn unsaved(&self, project: &ProjectId) -> Result<Vec<MediaItem>> {
        Ok(self
            .slot(project)?
            .current()
            .iter()
            .filter(|item| item.unsaved)
            .cloned()
            .collect())
    }

    /// Retry the durable-index write for an unsaved item.
    ///
    /// Idempotent: an already-indexed item is left untouched and nothing is
    /// written.
    pub fn retry_save(&self, project: &ProjectId, id: &MediaId) -> Result<SaveStatus> {
        let slot = self.slot(project)?;
        let _writer = slot.writer.lock().unwrap_or_else(|e| e.into_inner());

        let current = slot.current();
        let item = current
            .get(id)
            .ok_or_else(|| SpliceError::NotFound(format!("media item {} in project {}", id, project)))?;
        if !item.unsaved {
            return Ok(SaveStatus::AlreadySaved);
        }

        let mut next = (*current).clone();
        match self.index.save(project, &next.to_vec()) {
            Ok(()) => {
                clear_unsaved(&mut next);
                slot.publish(next);
                tracing::info!(project = %project, item = %id, "unsaved item indexed on retry");
                Ok(SaveStatus::Saved)
            }
            Err(e) => {
                if let Some(entry) = next.items.get_mut(id) {
                    entry.save_error = Some(e.to_string());
                }
                slot.publish(next);
                Err(SpliceError::IndexError(format!("retry failed for {}: {}", id, e)))
            }
        }
    }

    /// Retry the index write until nothing is unsaved or `attempts` run out,
    /// sleeping `delay` between tries. Returns the items still unsaved.
    ///
    /// The `unsaved` state only lives in this process, so callers about to
    /// exit use this to get their items indexed first.
    pub fn flush_unsaved(&self, project: &ProjectId, attempts: usize, delay: Duration) -> Result<Vec<MediaItem>> {
        for attempt in 0..attempts {
            let pending = self.unsaved(project)?;
            let Some(first) = pending.first() else {
                return Ok(Vec::new());
            };
            if attempt > 0 {
                std::thread::sleep(delay);
            }
            if let Err(e) = self.retry_save(project, &first.id) {
                tracing::warn!(project = %project, attempt = attempt + 1, error = %e, "index still failing");
            }
        }
        self.unsaved(project)
    }

    /// Register media files that exist on disk but have no record, for
    /// instance after a crash between the durable write and the index
    /// write. Files of unknown type are skipped.
    pub fn adopt_files(&self, project: &ProjectId, files: &[PathBuf]) -> Result<Vec<MediaId>> {
        let known: HashSet<PathBuf> = self
            .slot(project)?
            .current()
            .iter()
            .filter_map(|item| item.durable_path.clone())
            .collect();

        let mut adopted = Vec::new();
        for path in files.iter().filter(|p| !known.contains(*p)) {
            let media_type = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(MediaType::from_extension);
            let (Some(media_type), Some(name)) = (media_type, path.file_name().and_then(|n| n.to_str())) else {
                tracing::warn!(project = %project, path = %path.display(), "skipping file of unknown media type");
                continue;
            };

            let mut item = MediaItem::new(name, media_type, &file_uri(path));
            item.durable_path = Some(path.clone());
            item.is_durable = true;
            item.byte_size = std::fs::metadata(path)?.len();
            item.metadata.source = Some("recovered".to_string());
            item.metadata.content_hash = Some(ContentHash::from_file(path)?.to_prefixed_hex());
            adopted.push(self.insert(project, item)?);
        }

        if !adopted.is_empty() {
            tracing::info!(project = %project, count = adopted.len(), "recovered unindexed media files");
        }
        Ok(adopted)
    }

    /// Remove an item and release its blob handle.
    ///
    /// The durable file is left in place; only the record goes away.
    pub fn remove(&self, project: &ProjectId, id: &MediaId) -> Result<Option<MediaItem>> {
        let slot = self.slot(project)?;
        let _writer = slot.writer.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = (*slot.current()).clone();
        let Some(removed) = next.remove(id) else {
            return Ok(None);
        };
        if is_blob_uri(&removed.primary_uri) {
            self.blobs.revoke(&removed.primary_uri);
        }
        slot.publish(next.clone());

        self.index.save(project, &next.to_vec()).map_err(|e| {
            tracing::warn!(project = %project, item = %id, error = %e, "index not updated after removal");
            e
        })?;
        if next.iter().any(|entry| entry.unsaved) {
            clear_unsaved(&mut next);
            slot.publish(next);
        }
        Ok(Some(removed))
    }

    /// Read an item's bytes through the shared source resolver (preview path)
    pub fn read_bytes(
        &self,
        project: &ProjectId,
        id: &MediaId,
        fetcher: &dyn Fetcher,
    ) -> Result<ResolvedSource> {
        let item = self
            .get(project, id)?
            .ok_or_else(|| SpliceError::NotFound(format!("media item {} in project {}", id, project)))?;
        SourceResolver::new(&self.blobs, fetcher)
            .resolve(&item)
            .map_err(|e| SpliceError::NotFound(format!("{}: {}", id, e)))
    }

    fn slot(&self, project: &ProjectId) -> Result<Arc<ProjectSlot>> {
        if let Some(slot) = self
            .projects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(project)
        {
            return Ok(slot.clone());
        }

        // Load without holding the map lock; if another thread got there
        // first its slot wins and this load is dropped.
        let items = self
            .index
            .load(project)?
            .into_iter()
            .map(|item| self.repair_primary_uri(item))
            .collect();
        let loaded = Arc::new(ProjectSlot {
            writer: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(ProjectSnapshot::from_items(items))),
        });

        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        Ok(projects.entry(project.clone()).or_insert(loaded).clone())
    }

    /// Blob handles from a previous process are dead; point the item back at
    /// its durable file, or at the remote origin when it has none.
    fn repair_primary_uri(&self, mut item: MediaItem) -> MediaItem {
        if !is_blob_uri(&item.primary_uri) || self.blobs.is_live(&item.primary_uri) {
            return item;
        }
        let repaired = item
            .confirmed_durable_path()
            .map(file_uri)
            .or_else(|| item.origin_uri.clone());
        if let Some(uri) = repaired {
            tracing::debug!(item = %item.id, uri = %uri, "replaced dead blob handle");
            item.primary_uri = uri;
        }
        item
    }
}

/// A successful index write persists the whole table, so every flag clears.
fn clear_unsaved(snapshot: &mut ProjectSnapshot) {
    for entry in snapshot.items.values_mut() {
        entry.unsaved = false;
        entry.save_error = None;
    }
}

fn validate_candidate(item: &MediaItem) -> Result<()> {
    if item.name.trim().is_empty() {
        return Err(SpliceError::ValidationError("media item needs a name".to_string()));
    }
    if item.primary_uri.is_empty() {
        return Err(SpliceError::ValidationError(format!(
            "media item '{}' has no primary URI",
            item.name
        )));
    }
    if item.is_durable && item.durable_path.is_none() {
        return Err(SpliceError::ValidationError(format!(
            "media item '{}' is marked durable without a durable path",
            item.name
        )));
    }
    Ok(())
}

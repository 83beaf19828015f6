//! Durable media index
//!
//! One keyed table per project, mapping item id to its full record.

use crate::types::{IndexFile, MediaItem};
use splice_core::{ProjectId, Result, SpliceError};
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_FILE_NAME: &str = "media-index.toml";

/// Metadata persistence for the registry.
///
/// Distinct from the durable file write done during acquisition: a failure
/// here only means the record is not yet indexed.
pub trait IndexStore: Send + Sync {
    /// Load every item recorded for a project (empty if none)
    fn load(&self, project: &ProjectId) -> Result<Vec<MediaItem>>;

    /// Replace the project's index with `items`
    fn save(&self, project: &ProjectId, items: &[MediaItem]) -> Result<()>;
}

/// TOML index at `<root>/<project-id>/media-index.toml`
#[derive(Debug, Clone)]
pub struct TomlIndexStore {
    root: PathBuf,
}

impl TomlIndexStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of a project's index file
    pub fn index_path(&self, project: &ProjectId) -> PathBuf {
        self.root.join(project.as_str()).join(INDEX_FILE_NAME)
    }
}

impl IndexStore for TomlIndexStore {
    fn load(&self, project: &ProjectId) -> Result<Vec<MediaItem>> {
        let path = self.index_path(project);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let file: IndexFile = toml::from_str(&content).map_err(|e| {
            SpliceError::IndexError(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let mut items: Vec<MediaItem> = file.items.into_values().collect();
        items.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    fn save(&self, project: &ProjectId, items: &[MediaItem]) -> Result<()> {
        let path = self.index_path(project);
        let dir = path
            .parent()
            .ok_or_else(|| SpliceError::IndexError(format!("No parent for {}", path.display())))?;
        fs::create_dir_all(dir).map_err(|e| {
            SpliceError::IndexError(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let mut file = IndexFile::default();
        for item in items {
            let mut record = item.clone();
            record.unsaved = false;
            record.save_error = None;
            file.items.insert(record.id.to_string(), record);
        }
        let content = toml::to_string_pretty(&file)?;

        // Replace atomically so a crash never leaves a truncated index.
        let staging = dir.join(format!(".{}.tmp", INDEX_FILE_NAME));
        fs::write(&staging, content)
            .and_then(|_| fs::rename(&staging, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&staging);
                SpliceError::IndexError(format!("Failed to write {}: {}", path.display(), e))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_index_test_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_index_loads_empty() {
        let dir = temp_dir();
        let store = TomlIndexStore::new(&dir);
        let project = ProjectId::new("empty").unwrap();
        assert!(store.load(&project).unwrap().is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_and_load() {
        let dir = temp_dir();
        let store = TomlIndexStore::new(&dir);
        let project = ProjectId::new("demo").unwrap();

        let mut a = MediaItem::new("a.png", MediaType::Image, "blob:splice/a");
        a.added_at = Some("2026-01-01T00:00:00Z".to_string());
        let mut b = MediaItem::new("b.mp4", MediaType::Video, "https://cdn/b.mp4");
        b.added_at = Some("2026-01-02T00:00:00Z".to_string());
        b.unsaved = true;
        b.save_error = Some("disk".to_string());

        store.save(&project, &[b.clone(), a.clone()]).unwrap();
        let loaded = store.load(&project).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, a.id);
        assert_eq!(loaded[1].id, b.id);
        assert!(!loaded[1].unsaved);
        assert!(loaded[1].save_error.is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_index_is_an_index_error() {
        let dir = temp_dir();
        let store = TomlIndexStore::new(&dir);
        let project = ProjectId::new("demo").unwrap();
        let path = store.index_path(&project);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "items = 3").unwrap();

        assert!(matches!(store.load(&project), Err(SpliceError::IndexError(_))));

        fs::remove_dir_all(&dir).ok();
    }
}

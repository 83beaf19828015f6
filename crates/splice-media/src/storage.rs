//! Durable per-project file storage
//!
//! Stores acquired media at `<root>/<project-id>/media/<file-name>`.

use splice_core::{ProjectId, StorageFailure};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Host-managed storage that survives a process restart
pub trait DurableStorage: Send + Sync {
    /// Write `bytes` as a new file in the project's media directory.
    ///
    /// Must never replace an existing file; returns the final path.
    fn write_new(
        &self,
        project: &ProjectId,
        file_name: &str,
        bytes: &[u8],
    ) -> std::result::Result<PathBuf, StorageFailure>;

    /// Delete a file previously returned by `write_new`
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// Filesystem-backed durable storage rooted at the projects directory
#[derive(Debug, Clone)]
pub struct ProjectStorage {
    root: PathBuf,
}

impl ProjectStorage {
    /// Create storage rooted at `root` (normally `<data_dir>/projects`)
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory holding everything for one project
    pub fn project_dir(&self, project: &ProjectId) -> PathBuf {
        self.root.join(project.as_str())
    }

    /// Directory holding a project's media files
    pub fn media_dir(&self, project: &ProjectId) -> PathBuf {
        self.project_dir(project).join("media")
    }

    /// List stored media files for a project
    pub fn list(&self, project: &ProjectId) -> std::io::Result<Vec<PathBuf>> {
        let dir = self.media_dir(project);
        let mut files = Vec::new();
        if !dir.exists() {
            return Ok(files);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(true);
            if path.is_file() && !hidden {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl DurableStorage for ProjectStorage {
    fn write_new(
        &self,
        project: &ProjectId,
        file_name: &str,
        bytes: &[u8],
    ) -> std::result::Result<PathBuf, StorageFailure> {
        if file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains(['/', '\\'])
        {
            return Err(StorageFailure::Unknown(format!(
                "invalid file name '{}'",
                file_name
            )));
        }

        let dir = self.media_dir(project);
        fs::create_dir_all(&dir).map_err(|e| StorageFailure::from_io(&e))?;

        let dest = dir.join(file_name);

        // Write to a hidden staging file first so `dest` only ever appears complete.
        let staging = dir.join(format!(".{}.{}.partial", file_name, uuid::Uuid::new_v4().simple()));
        let written = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&staging);
            return Err(StorageFailure::from_io(&e));
        }

        // Linking fails if `dest` exists, so a concurrent writer is never replaced.
        let linked = fs::hard_link(&staging, &dest);
        let _ = fs::remove_file(&staging);
        if let Err(e) = linked {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(StorageFailure::Unknown(format!("{} already exists", dest.display())));
            }
            return Err(StorageFailure::from_io(&e));
        }

        tracing::debug!(path = %dest.display(), bytes = bytes.len(), "durable write complete");
        Ok(dest)
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }
}

//! Job tracking for generation attempts
//!
//! Jobs are persisted as `.job.toml` files in `<project>/jobs/` so a
//! restarted process can still see which remote jobs were submitted.

use crate::transport::ChannelKind;
use serde::{Deserialize, Serialize};
use splice_core::{now_iso8601, ProjectId, Result, SpliceError};
use std::path::{Path, PathBuf};

/// Status of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Processing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// A tracked generation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Unique job ID (UUID)
    pub id: String,
    /// Service-side job ID, once the request was queued
    #[serde(default)]
    pub remote_id: Option<String>,
    pub model_id: String,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,
    /// ISO 8601 timestamp when submitted
    pub submitted_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub channel: Option<ChannelKind>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Registry id of the acquired item
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub result_uri: Option<String>,
}

impl GenerationJob {
    pub fn new(model_id: &str, prompt: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote_id: None,
            model_id: model_id.to_string(),
            status: JobStatus::Submitted,
            progress: 0,
            submitted_at: now_iso8601(),
            updated_at: None,
            channel: None,
            error: None,
            prompt: Some(prompt.to_string()),
            media_id: None,
            result_uri: None,
        }
    }
}

/// File-based job store
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Store under `<projects_root>/<project>/jobs`
    pub fn for_project(projects_root: &Path, project: &ProjectId) -> Self {
        Self::new(projects_root.join(project.as_str()).join("jobs"))
    }

    pub fn save(&self, job: &GenerationJob) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(format!("{}.job.toml", job.id));

        let wrapper = JobFile { job: job.clone() };
        let content = toml::to_string_pretty(&wrapper)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn load(&self, job_id: &str) -> Result<GenerationJob> {
        let path = self.root.join(format!("{}.job.toml", job_id));
        if !path.exists() {
            return Err(SpliceError::NotFound(format!("Job not found: {}", job_id)));
        }

        let content = std::fs::read_to_string(&path)?;
        let file: JobFile = toml::from_str(&content)?;
        Ok(file.job)
    }

    /// All tracked jobs, oldest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<GenerationJob>> {
        let mut jobs = Vec::new();

        if !self.root.exists() {
            return Ok(jobs);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".job.toml"))
                .unwrap_or(false)
            {
                let content = std::fs::read_to_string(&path)?;
                match toml::from_str::<JobFile>(&content) {
                    Ok(file) => jobs.push(file.job),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable job file"),
                }
            }
        }

        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    /// Jobs still waiting on the remote service
    pub fn list_active(&self) -> Result<Vec<GenerationJob>> {
        Ok(self.list()?.into_iter().filter(|job| !job.status.is_finished()).collect())
    }

    pub fn update_status(&self, job_id: &str, status: JobStatus, progress: u8) -> Result<GenerationJob> {
        let mut job = self.load(job_id)?;
        job.status = status;
        job.progress = progress;
        job.updated_at = Some(now_iso8601());
        self.save(&job)?;
        Ok(job)
    }
}

#[derive(Serialize, Deserialize)]
struct JobFile {
    job: GenerationJob,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_job_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_job_creation() {
        let job = GenerationJob::new("veo3-fast", "a lighthouse");
        assert_eq!(job.model_id, "veo3-fast");
        assert_eq!(job.status, JobStatus::Submitted);
        assert_eq!(job.progress, 0);
        assert!(!job.id.is_empty());
        assert!(job.submitted_at.contains('T'));
        assert!(!job.status.is_finished());
    }

    #[test]
    fn test_job_store_save_load() {
        let dir = temp_dir();
        let store = JobStore::new(&dir);

        let mut job = GenerationJob::new("flux-dev", "stone texture");
        job.remote_id = Some("req-42".to_string());
        job.channel = Some(ChannelKind::Network);
        store.save(&job).unwrap();

        let loaded = store.load(&job.id).unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.remote_id.as_deref(), Some("req-42"));
        assert_eq!(loaded.channel, Some(ChannelKind::Network));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_job_store_list_per_project() {
        let dir = temp_dir();
        let a = JobStore::for_project(&dir, &ProjectId::new("a").unwrap());
        let b = JobStore::for_project(&dir, &ProjectId::new("b").unwrap());

        a.save(&GenerationJob::new("m1", "x")).unwrap();
        a.save(&GenerationJob::new("m2", "y")).unwrap();
        b.save(&GenerationJob::new("m3", "z")).unwrap();
        std::fs::write(dir.join("a").join("jobs").join("junk.job.toml"), "not toml [").unwrap();

        assert_eq!(a.list().unwrap().len(), 2);
        assert_eq!(b.list().unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_job_store_update_status() {
        let dir = temp_dir();
        let store = JobStore::new(&dir);

        let job = GenerationJob::new("kling", "chair");
        store.save(&job).unwrap();

        let updated = store.update_status(&job.id, JobStatus::Processing, 50).unwrap();
        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(updated.progress, 50);
        assert!(updated.updated_at.is_some());

        let reloaded = store.load(&job.id).unwrap();
        assert_eq!(reloaded.status, JobStatus::Processing);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_list_active_skips_finished_jobs() {
        let dir = temp_dir();
        let store = JobStore::new(&dir);

        let running = GenerationJob::new("veo3-fast", "tide");
        let done = GenerationJob::new("kling", "tide");
        let dropped = GenerationJob::new("flux-dev", "tide");
        for job in [&running, &done, &dropped] {
            store.save(job).unwrap();
        }
        store.update_status(&running.id, JobStatus::Processing, 40).unwrap();
        store.update_status(&done.id, JobStatus::Complete, 100).unwrap();
        store.update_status(&dropped.id, JobStatus::Cancelled, 0).unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
        assert_eq!(store.list().unwrap().len(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_job_not_found() {
        let dir = temp_dir();
        let store = JobStore::new(&dir);
        assert!(matches!(store.load("nonexistent-id"), Err(SpliceError::NotFound(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}

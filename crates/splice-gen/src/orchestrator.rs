//! Multi-model generation orchestrator
//!
//! Each selected model runs on its own scoped thread:
//! `Pending -> Submitted -> (Polling) -> Completed | Failed | Cancelled`.
//! A model's result is acquired as soon as it is ready, so one slow or
//! failing model never holds back the others. Outcomes are collected in
//! completion order.

use crate::acquire::{extension_for, AcquireError, AcquireRequest, Acquirer};
use crate::capability::{combine, sanitize, CombinedCapabilities, GenerationParams, ModelCapabilities};
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::config::SpliceConfig;
use crate::job::{GenerationJob, JobStatus, JobStore};
use crate::transport::{ChannelKind, GenerationOutcome, ModelTarget, PollObserver, Transport, TransportError};
use serde::{Deserialize, Serialize};
use splice_core::{now_iso8601, ProjectId, SpliceError};
use splice_media::MediaItem;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

/// Per-model lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Pending,
    Submitted,
    #[serde(rename = "processing")]
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelStatus::Pending => "pending",
            ModelStatus::Submitted => "submitted",
            ModelStatus::Polling => "processing",
            ModelStatus::Completed => "completed",
            ModelStatus::Failed => "failed",
            ModelStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Progress update for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub model_id: String,
    pub status: ModelStatus,
    pub progress_percent: u8,
    pub message: String,
}

/// Receives progress events, possibly from several threads at once
pub trait ProgressSink: Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Cooperative batch cancellation
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why one model produced nothing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("provider '{0}' is disabled")]
    ProviderDisabled(String),

    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("generation failed: {0}")]
    Transport(TransportError),

    #[error("{0}")]
    Acquisition(AcquireError),
}

impl From<FailureReason> for SpliceError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Transport(e) => e.into(),
            FailureReason::Acquisition(e) => e.into(),
            FailureReason::Validation(msg) => SpliceError::ValidationError(msg),
            other => SpliceError::ValidationError(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelFailure {
    pub model_id: String,
    pub reason: FailureReason,
}

/// End-of-batch aggregate, in completion order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(String, MediaItem)>,
    pub failed: Vec<ModelFailure>,
    pub cancelled: Vec<String>,
}

impl BatchReport {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when some but not all models produced an item
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && (!self.failed.is_empty() || !self.cancelled.is_empty())
    }
}

/// One generation request fanned out over several models
#[derive(Debug, Clone)]
pub struct GenerationBatch {
    pub project: ProjectId,
    pub model_ids: Vec<String>,
    pub params: GenerationParams,
    pub allow_fallback: bool,
}

enum ModelResult {
    Completed(MediaItem),
    Failed(FailureReason),
    Cancelled,
}

pub struct Orchestrator {
    catalog: Arc<ModelCatalog>,
    transport: Arc<Transport>,
    acquirer: Arc<Acquirer>,
    config: SpliceConfig,
    jobs_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        transport: Arc<Transport>,
        acquirer: Arc<Acquirer>,
        config: SpliceConfig,
    ) -> Self {
        Self {
            catalog,
            transport,
            acquirer,
            config,
            jobs_root: None,
        }
    }

    /// Record every attempt under `<projects_root>/<project>/jobs`
    pub fn with_job_tracking(mut self, projects_root: PathBuf) -> Self {
        self.jobs_root = Some(projects_root);
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Run every model of the batch concurrently and wait for all of them
    pub fn run(&self, batch: &GenerationBatch, sink: &dyn ProgressSink, cancel: &CancelToken) -> BatchReport {
        let mut report = BatchReport::default();

        let mut ids: Vec<&str> = Vec::new();
        for id in &batch.model_ids {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }

        let mut selected: Vec<&ModelDescriptor> = Vec::new();
        for id in ids {
            let reason = match self.catalog.get(id) {
                Some(model) if self.config.is_enabled(&model.provider) => {
                    selected.push(model);
                    continue;
                }
                Some(model) => FailureReason::ProviderDisabled(model.provider.clone()),
                None => FailureReason::UnknownModel(id.to_string()),
            };
            sink.emit(ProgressEvent {
                model_id: id.to_string(),
                status: ModelStatus::Failed,
                progress_percent: 0,
                message: reason.to_string(),
            });
            report.failed.push(ModelFailure {
                model_id: id.to_string(),
                reason,
            });
        }

        let caps: Vec<&ModelCapabilities> = selected.iter().map(|m| &m.capabilities).collect();
        let combined = combine(&caps);
        for model in &selected {
            sink.emit(ProgressEvent {
                model_id: model.id.clone(),
                status: ModelStatus::Pending,
                progress_percent: 0,
                message: "Waiting to start".to_string(),
            });
        }

        tracing::info!(project = %batch.project, models = selected.len(), "starting generation batch");

        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            let combined = &combined;
            for model in selected.iter().copied() {
                let tx = tx.clone();
                scope.spawn(move || {
                    let result = self.run_model(batch, model, combined, sink, cancel);
                    let _ = tx.send((model.id.clone(), result));
                });
            }
            drop(tx);

            for (model_id, result) in rx {
                match result {
                    ModelResult::Completed(item) => report.succeeded.push((model_id, item)),
                    ModelResult::Failed(reason) => {
                        tracing::warn!(model = %model_id, error = %reason, "model failed");
                        report.failed.push(ModelFailure { model_id, reason });
                    }
                    ModelResult::Cancelled => report.cancelled.push(model_id),
                }
            }
        });

        tracing::info!(
            project = %batch.project,
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled.len(),
            "generation batch finished"
        );
        report
    }

    fn run_model(
        &self,
        batch: &GenerationBatch,
        model: &ModelDescriptor,
        combined: &CombinedCapabilities,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> ModelResult {
        if cancel.is_cancelled() {
            emit(sink, cancel, &model.id, ModelStatus::Cancelled, 0, "Cancelled".to_string());
            return ModelResult::Cancelled;
        }

        let request = match sanitize(model, combined, &batch.params) {
            Ok(request) => request,
            Err(e) => {
                let reason = FailureReason::Validation(e.to_string());
                emit(sink, cancel, &model.id, ModelStatus::Failed, 0, reason.to_string());
                return ModelResult::Failed(reason);
            }
        };

        let run = ModelRun::new(model, sink, cancel, self.job_store(&batch.project), &request.prompt);
        run.emit(ModelStatus::Submitted, 5, format!("Submitting to {}", model.name));

        let target = ModelTarget {
            model_id: model.id.clone(),
            endpoint: self.config.endpoint_for(&model.provider, &model.endpoint),
            api_key: self.config.api_key(&model.provider).map(str::to_string),
        };

        match self.transport.send(&target, &request, batch.allow_fallback, &run) {
            GenerationOutcome::Failed {
                reason: TransportError::Cancelled,
            } => run.cancelled(),
            GenerationOutcome::Failed { reason } => run.failed(FailureReason::Transport(reason)),
            GenerationOutcome::Ready {
                remote_uri,
                metadata,
                job_id,
                ..
            } => {
                if cancel.is_cancelled() {
                    return run.cancelled();
                }
                run.emit(ModelStatus::Polling, 90, "Saving result".to_string());

                let acquire = AcquireRequest {
                    project: batch.project.clone(),
                    desired_filename: display_name(model, &request.prompt, &remote_uri),
                    remote_uri: remote_uri.clone(),
                    media_type: model.media,
                    model_id: model.id.clone(),
                    prompt: Some(request.prompt.clone()),
                    metadata,
                    job_id,
                };
                match self.acquirer.acquire(&acquire) {
                    Ok(item) => {
                        run.record(|job| {
                            job.status = JobStatus::Complete;
                            job.progress = 100;
                            job.result_uri = Some(remote_uri);
                            job.media_id = Some(item.id.to_string());
                        });
                        run.emit(ModelStatus::Completed, 100, format!("Saved {}", item.name));
                        ModelResult::Completed(item)
                    }
                    Err(e) => run.failed(FailureReason::Acquisition(e)),
                }
            }
        }
    }

    fn job_store(&self, project: &ProjectId) -> Option<JobStore> {
        self.jobs_root
            .as_ref()
            .map(|root| JobStore::for_project(root, project))
    }
}

fn emit(sink: &dyn ProgressSink, cancel: &CancelToken, model_id: &str, status: ModelStatus, percent: u8, message: String) {
    // Once cancelled, only completions and the final cancel notice get through.
    if cancel.is_cancelled() && !matches!(status, ModelStatus::Completed | ModelStatus::Cancelled) {
        return;
    }
    sink.emit(ProgressEvent {
        model_id: model_id.to_string(),
        status,
        progress_percent: percent,
        message,
    });
}

/// `<model-id>_<prompt words>.<ext>`
fn display_name(model: &ModelDescriptor, prompt: &str, remote_uri: &str) -> String {
    let words: Vec<String> = prompt
        .split_whitespace()
        .take(4)
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    let ext = extension_for(remote_uri, "", model.media);
    if words.is_empty() {
        format!("{}.{}", model.id, ext)
    } else {
        format!("{}_{}.{}", model.id, words.join("-"), ext)
    }
}

/// Progress and job bookkeeping for one model's attempt
struct ModelRun<'a> {
    model_id: &'a str,
    sink: &'a dyn ProgressSink,
    cancel: &'a CancelToken,
    job: Option<(JobStore, Mutex<GenerationJob>)>,
    last_percent: AtomicU8,
}

impl<'a> ModelRun<'a> {
    fn new(
        model: &'a ModelDescriptor,
        sink: &'a dyn ProgressSink,
        cancel: &'a CancelToken,
        store: Option<JobStore>,
        prompt: &str,
    ) -> Self {
        let job = store.map(|store| {
            let job = GenerationJob::new(&model.id, prompt);
            if let Err(e) = store.save(&job) {
                tracing::warn!(model = %model.id, error = %e, "failed to record job");
            }
            (store, Mutex::new(job))
        });
        Self {
            model_id: &model.id,
            sink,
            cancel,
            job,
            last_percent: AtomicU8::new(0),
        }
    }

    /// Emit, never letting the percentage go backwards
    fn emit(&self, status: ModelStatus, percent: u8, message: String) {
        let percent = self.last_percent.fetch_max(percent, Ordering::SeqCst).max(percent);
        emit(self.sink, self.cancel, self.model_id, status, percent, message);
    }

    fn record(&self, update: impl FnOnce(&mut GenerationJob)) {
        let Some((store, job)) = &self.job else {
            return;
        };
        let mut job = job.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut job);
        job.updated_at = Some(now_iso8601());
        if let Err(e) = store.save(&job) {
            tracing::warn!(model = %self.model_id, job = %job.id, error = %e, "failed to update job record");
        }
    }

    fn failed(&self, reason: FailureReason) -> ModelResult {
        let message = reason.to_string();
        self.record(|job| {
            job.status = JobStatus::Failed;
            job.error = Some(message.clone());
        });
        self.emit(ModelStatus::Failed, 0, message);
        ModelResult::Failed(reason)
    }

    fn cancelled(&self) -> ModelResult {
        self.record(|job| job.status = JobStatus::Cancelled);
        self.emit(ModelStatus::Cancelled, 0, "Cancelled".to_string());
        ModelResult::Cancelled
    }
}

impl PollObserver for ModelRun<'_> {
    fn on_accepted(&self, channel: ChannelKind, job_id: Option<&str>) {
        self.record(|job| {
            job.channel = Some(channel);
            job.remote_id = job_id.map(str::to_string);
            if job_id.is_some() {
                job.status = JobStatus::Processing;
            }
        });
        if let Some(id) = job_id {
            self.emit(ModelStatus::Polling, 10, format!("Queued as job {}", id));
        }
    }

    fn on_progress(&self, _job_id: &str, progress: Option<u8>) {
        let Some(progress) = progress else {
            return;
        };
        // Service progress maps onto 10..85; acquisition owns the rest.
        let percent = 10 + (u16::from(progress.min(100)) * 75 / 100) as u8;
        self.record(|job| job.progress = percent);
        self.emit(ModelStatus::Polling, percent, format!("Generating ({}%)", progress));
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

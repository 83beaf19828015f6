//! Splice Gen - Multi-model generation pipeline
//!
//! Resolves the parameters shared by the selected models, dispatches one
//! request per model over the privileged or network channel, and acquires
//! every result into durable project storage and the media registry.

pub mod acquire;
pub mod capability;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod job;
pub mod orchestrator;
pub mod transport;

pub use acquire::{AcquireError, AcquireRequest, Acquirer};
pub use capability::{
    combine, sanitize, CombinedCapabilities, GenerationParams, GenerationRequest, ModelCapabilities,
};
pub use catalog::{ModelCatalog, ModelDescriptor};
pub use channels::{create_transport, CommandBridge, HostBridge, NetworkChannel, PrivilegedChannel};
pub use config::SpliceConfig;
pub use job::{GenerationJob, JobStatus, JobStore};
pub use orchestrator::{
    BatchReport, CancelToken, FailureReason, GenerationBatch, ModelFailure, ModelStatus,
    Orchestrator, ProgressEvent, ProgressSink,
};
pub use transport::{
    ChannelKind, GenerationOutcome, JobState, OutcomeMetadata, Transport, TransportError,
    TransportPolicy,
};

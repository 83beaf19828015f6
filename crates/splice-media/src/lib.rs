//! Splice Media - Registry and storage for generated and imported media
//!
//! This crate owns the `MediaItem` record and everything that decides where
//! an item's bytes live: durable project storage, ephemeral in-process blob
//! handles, the durable index, and the shared byte-source resolver used by
//! preview and export.

mod blob;
mod fetch;
mod index;
mod registry;
mod source;
mod storage;
mod types;

pub use blob::{is_blob_uri, BlobStore};
pub use fetch::{Fetcher, HttpFetcher};
pub use index::{IndexStore, TomlIndexStore};
pub use registry::{MediaRegistry, ProjectSnapshot, SaveStatus};
pub use source::{ResolvedSource, SourceAttempt, SourceError, SourceKind, SourceResolver, SOURCE_PRIORITY};
pub use storage::{DurableStorage, ProjectStorage};
pub use types::{file_uri, MediaItem, MediaMetadata, MediaType};

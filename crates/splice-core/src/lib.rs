//! Splice Core - Foundational types for the Splice media pipeline
//!
//! This crate provides the types every other Splice crate depends on:
//! - `MediaId`, `ProjectId` - Stable identifiers
//! - `ContentHash` - SHA-256 based content hashing
//! - `StorageFailure` - Classified durable-write failures
//! - Error types and Result alias

mod error;
mod hash;
mod id;
mod timestamp;

pub use error::{SpliceError, StorageFailure, Result};
pub use hash::ContentHash;
pub use id::{MediaId, ProjectId};
pub use timestamp::{now_iso8601, now_millis};

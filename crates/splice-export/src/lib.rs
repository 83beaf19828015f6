//! Splice Export - Package project media into a zip archive
//!
//! Every item's bytes are read through the shared source resolver (durable
//! file, then in-memory handle, then remote origin) and the archive carries
//! a JSON manifest recording which source each entry came from.

mod manifest;
mod pack;

pub use manifest::{ExportManifest, ManifestEntry, SkippedItem};
pub use pack::{ExportArchive, PackagingEngine, MANIFEST_ENTRY};

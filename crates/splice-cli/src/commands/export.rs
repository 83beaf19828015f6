//! Archive export command

use super::{project_id, Session};
use anyhow::Result;
use splice_core::MediaId;
use splice_export::PackagingEngine;
use std::path::Path;

pub fn run(project: &str, output: &str, ids: &[String]) -> Result<()> {
    let project = project_id(project)?;
    let session = Session::open()?;
    let engine = PackagingEngine::new(session.registry.clone(), session.fetcher.clone());

    let ids: Vec<MediaId> = ids.iter().map(|id| MediaId::from_raw(id.as_str())).collect();
    let manifest = engine.pack_to_file(&project, &ids, Path::new(output))?;

    println!("Exported {} item(s) to {}", manifest.entries.len(), output);
    for entry in &manifest.entries {
        println!("  {} <- {} ({} bytes)", entry.file, entry.source, entry.byte_size);
    }
    if !manifest.skipped.is_empty() {
        println!("\nSkipped {} item(s):", manifest.skipped.len());
        for skipped in &manifest.skipped {
            println!("  {}: {}", skipped.name.as_deref().unwrap_or(&skipped.id), skipped.reason);
        }
    }

    if manifest.entries.is_empty() {
        anyhow::bail!("No item could be read; the archive only holds the manifest");
    }
    Ok(())
}

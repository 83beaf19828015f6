//! Project media commands

use super::{project_id, Session};
use anyhow::Result;
use clap::Subcommand;
use splice_core::MediaId;
use splice_media::{DurableStorage, MediaItem, ProjectStorage};
use std::time::Duration;

const INDEX_FLUSH_ATTEMPTS: usize = 3;
const INDEX_FLUSH_DELAY: Duration = Duration::from_millis(500);

#[derive(Subcommand)]
pub enum MediaCommands {
    /// List media in a project
    List {
        /// Project id
        #[arg(long)]
        project: String,

        /// Only items missing from the durable index
        #[arg(long)]
        unsaved: bool,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show one media item
    Info {
        /// Media id
        id: String,

        /// Project id
        #[arg(long)]
        project: String,
    },

    /// Index media files that are on disk but missing from the project index
    Retry {
        /// Project id
        #[arg(long)]
        project: String,
    },

    /// Remove an item and delete its stored file
    Remove {
        /// Media id
        id: String,

        /// Project id
        #[arg(long)]
        project: String,

        /// Leave the stored file on disk (a later `media retry` indexes it again)
        #[arg(long)]
        keep_file: bool,
    },
}

pub fn run(cmd: MediaCommands) -> Result<()> {
    let session = Session::open()?;

    match cmd {
        MediaCommands::List {
            project,
            unsaved,
            format,
        } => run_list(&session, &project, unsaved, &format),
        MediaCommands::Info { id, project } => run_info(&session, &project, &id),
        MediaCommands::Retry { project } => run_retry(&session, &project),
        MediaCommands::Remove {
            id,
            project,
            keep_file,
        } => run_remove(&session, &project, &id, keep_file),
    }
}

fn run_retry(session: &Session, project: &str) -> Result<()> {
    let project = project_id(project)?;
    let storage = ProjectStorage::new(&session.projects_root);

    let files = storage.list(&project)?;
    let adopted = session.registry.adopt_files(&project, &files)?;
    let stranded = session
        .registry
        .flush_unsaved(&project, INDEX_FLUSH_ATTEMPTS, INDEX_FLUSH_DELAY)?;

    if adopted.is_empty() && stranded.is_empty() {
        println!("All {} stored file(s) are indexed.", files.len());
        return Ok(());
    }
    if !adopted.is_empty() {
        println!("Recovered {} unindexed file(s):", adopted.len());
        for id in &adopted {
            if let Some(item) = session.registry.get(&project, id)? {
                println!("  {} {} ({})", item.id, item.name, item.media_type);
            }
        }
    }
    if !stranded.is_empty() {
        for item in &stranded {
            println!(
                "  unsaved {}: {}",
                item.name,
                item.save_error.as_deref().unwrap_or("index write failed")
            );
        }
        anyhow::bail!("The project index could not be written; run `media retry` again");
    }
    Ok(())
}

fn run_remove(session: &Session, project: &str, id: &str, keep_file: bool) -> Result<()> {
    let project = project_id(project)?;
    let Some(item) = session.registry.remove(&project, &MediaId::from_raw(id))? else {
        anyhow::bail!("Media '{}' not found in project '{}'", id, project);
    };
    println!("Removed '{}' ({})", item.name, item.id);

    let Some(path) = item.confirmed_durable_path() else {
        return Ok(());
    };
    if keep_file {
        println!("  File kept at {}", path.display());
        return Ok(());
    }
    match ProjectStorage::new(&session.projects_root).remove(path) {
        Ok(()) => println!("  Deleted {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => anyhow::bail!("Record removed but {} could not be deleted: {}", path.display(), e),
    }
    Ok(())
}

fn run_list(session: &Session, project: &str, unsaved_only: bool, format: &str) -> Result<()> {
    let project = project_id(project)?;
    let items = if unsaved_only {
        session.registry.unsaved(&project)?
    } else {
        session.registry.list(&project)?
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No media in project '{}'.", project);
        return Ok(());
    }

    println!("{} item(s):\n", items.len());
    for item in &items {
        println!("  {} {} ({}) {}", item.id, item.name, item.media_type, state(item));
    }
    Ok(())
}

fn run_info(session: &Session, project: &str, id: &str) -> Result<()> {
    let project = project_id(project)?;
    let Some(item) = session.registry.get(&project, &MediaId::from_raw(id))? else {
        anyhow::bail!("Media '{}' not found in project '{}'", id, project);
    };

    println!("Media: {}", item.id);
    println!("  Name: {}", item.name);
    println!("  Type: {}", item.media_type);
    println!("  State: {}", state(&item));
    println!("  URI: {}", item.primary_uri);
    if let Some(ref origin) = item.origin_uri {
        println!("  Origin: {}", origin);
    }
    if let Some(path) = item.confirmed_durable_path() {
        println!("  File: {}", path.display());
    }
    if item.byte_size > 0 {
        println!("  Size: {} bytes", item.byte_size);
    }
    if let (Some(w), Some(h)) = (item.width, item.height) {
        println!("  Dimensions: {}x{}", w, h);
    }
    if let Some(duration) = item.duration {
        println!("  Duration: {:.1}s", duration);
    }
    if let Some(ref model) = item.metadata.model_id {
        println!("  Model: {}", model);
    }
    if let Some(ref prompt) = item.metadata.prompt {
        println!("  Prompt: {}", prompt);
    }
    if let Some(ref err) = item.save_error {
        println!("  Save error: {}", err);
    }
    Ok(())
}

fn state(item: &MediaItem) -> &'static str {
    match (item.is_durable, item.unsaved) {
        (_, true) => "unsaved",
        (true, false) => "durable",
        (false, false) => "not durable",
    }
}

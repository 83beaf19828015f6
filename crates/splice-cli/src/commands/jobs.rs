//! Generation job commands

use super::project_id;
use anyhow::Result;
use clap::Subcommand;
use splice_gen::{JobStore, SpliceConfig};

#[derive(Subcommand)]
pub enum JobCommands {
    /// List generation jobs of a project
    List {
        /// Project id
        #[arg(long)]
        project: String,

        /// Only jobs that have not finished
        #[arg(long)]
        active: bool,
    },

    /// Show status of a generation job
    Status {
        /// Job ID
        id: String,

        /// Project id
        #[arg(long)]
        project: String,
    },
}

pub fn run(cmd: JobCommands) -> Result<()> {
    let config = SpliceConfig::load()?;
    let root = config.projects_root();

    match cmd {
        JobCommands::List { project, active } => {
            let store = JobStore::for_project(&root, &project_id(&project)?);
            let jobs = if active { store.list_active()? } else { store.list()? };

            if jobs.is_empty() {
                println!("No {}generation jobs found.", if active { "active " } else { "" });
                return Ok(());
            }

            println!("{} job(s):\n", jobs.len());
            for job in &jobs {
                println!(
                    "  {} ({}) {:?} {}%",
                    job.id, job.model_id, job.status, job.progress
                );
            }
            Ok(())
        }
        JobCommands::Status { id, project } => {
            let store = JobStore::for_project(&root, &project_id(&project)?);
            let job = store.load(&id)?;

            println!("Job: {}", job.id);
            println!("  Model: {}", job.model_id);
            println!("  Status: {:?}", job.status);
            println!("  Progress: {}%", job.progress);
            println!("  Submitted: {}", job.submitted_at);
            if let Some(ref remote) = job.remote_id {
                println!("  Remote job: {}", remote);
            }
            if let Some(channel) = job.channel {
                println!("  Channel: {:?}", channel);
            }
            if let Some(ref prompt) = job.prompt {
                println!("  Prompt: {}", prompt);
            }
            if let Some(ref err) = job.error {
                println!("  Error: {}", err);
            }
            if let Some(ref media) = job.media_id {
                println!("  Media: {}", media);
            }
            Ok(())
        }
    }
}

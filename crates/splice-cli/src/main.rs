//! Splice CLI - Command-line interface for the Splice media pipeline

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{export, generate, jobs, media, models};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splice")]
#[command(about = "Multi-model media generation, storage and export", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog models, or the combined capabilities of a selection
    Models {
        /// Comma-separated model ids to combine
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Generate media with one or more models in parallel
    Generate(generate::GenerateArgs),

    /// Project media operations
    #[command(subcommand)]
    Media(media::MediaCommands),

    /// Package project media into a zip archive
    Export {
        /// Project id
        #[arg(long)]
        project: String,

        /// Output archive path
        #[arg(short, long)]
        output: String,

        /// Media ids to export (all project media when omitted)
        ids: Vec<String>,
    },

    /// Generation job records
    #[command(subcommand)]
    Jobs(jobs::JobCommands),
}

fn setup_logging() {
    let filter = std::env::var("SPLICE_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Models { select, format } => models::run(&select, &format),
        Commands::Generate(args) => generate::run(args),
        Commands::Media(cmd) => media::run(cmd),
        Commands::Export { project, output, ids } => export::run(&project, &output, &ids),
        Commands::Jobs(cmd) => jobs::run(cmd),
    }
}

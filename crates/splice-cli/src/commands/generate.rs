//! Multi-model generation command

use super::{load_catalog, project_id, Session};
use anyhow::Result;
use clap::Args;
use splice_gen::{
    create_transport, Acquirer, CancelToken, GenerationBatch, GenerationParams, ModelStatus, Orchestrator,
    ProgressEvent,
};
use splice_media::{DurableStorage, ProjectStorage};
use std::sync::Arc;
use std::time::Duration;

const INDEX_FLUSH_ATTEMPTS: usize = 3;
const INDEX_FLUSH_DELAY: Duration = Duration::from_millis(500);

#[derive(Args)]
pub struct GenerateArgs {
    /// Project id
    #[arg(long)]
    pub project: String,

    /// Comma-separated model ids
    #[arg(long, value_delimiter = ',', required = true)]
    pub models: Vec<String>,

    /// Prompt text
    #[arg(long, short)]
    pub prompt: String,

    /// Duration in seconds (snapped to the nearest supported value)
    #[arg(long)]
    pub duration: Option<u32>,

    /// Aspect ratio (e.g., 16:9)
    #[arg(long)]
    pub aspect_ratio: Option<String>,

    /// Resolution (e.g., 720p)
    #[arg(long)]
    pub resolution: Option<String>,

    /// Random seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,

    /// Negative prompt
    #[arg(long)]
    pub negative_prompt: Option<String>,

    /// Never fall back from the privileged channel to direct network
    #[arg(long)]
    pub no_fallback: bool,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let project = project_id(&args.project)?;
    let session = Session::open()?;
    let catalog = Arc::new(load_catalog(&session.config)?);

    let storage: Arc<dyn DurableStorage> = Arc::new(ProjectStorage::new(&session.projects_root));
    let acquirer = Arc::new(Acquirer::new(session.fetcher.clone(), storage, session.registry.clone()));
    let transport = Arc::new(create_transport(&session.config, None));
    let allow_fallback = session.config.transport.allow_fallback && !args.no_fallback;

    let orchestrator = Orchestrator::new(catalog, transport, acquirer, session.config.clone())
        .with_job_tracking(session.projects_root.clone());

    let batch = GenerationBatch {
        project,
        model_ids: args.models,
        params: GenerationParams {
            prompt: args.prompt,
            aspect_ratio: args.aspect_ratio,
            resolution: args.resolution,
            duration: args.duration,
            negative_prompt: args.negative_prompt,
            seed: args.seed,
            ..Default::default()
        },
        allow_fallback,
    };

    println!("Generating with {} model(s)...", batch.model_ids.len());
    let report = orchestrator.run(&batch, &print_progress, &CancelToken::new());

    // Unsaved flags die with this process; index them before exiting.
    let stranded = session
        .registry
        .flush_unsaved(&batch.project, INDEX_FLUSH_ATTEMPTS, INDEX_FLUSH_DELAY)?;

    println!();
    for (model_id, item) in &report.succeeded {
        let location = item
            .durable_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| item.primary_uri.clone());
        println!("  ok      {} -> {} ({})", model_id, item.id, location);
        if let Some(lost) = stranded.iter().find(|s| s.id == item.id) {
            println!(
                "          not recorded in the project index: {}",
                lost.save_error.as_deref().unwrap_or("index write failed")
            );
        }
    }
    for failure in &report.failed {
        println!("  failed  {}: {}", failure.model_id, failure.reason);
    }
    for model_id in &report.cancelled {
        println!("  cancel  {}", model_id);
    }

    println!(
        "\n{} succeeded, {} failed, {} cancelled",
        report.succeeded_count(),
        report.failed_count(),
        report.cancelled.len()
    );

    if !stranded.is_empty() {
        anyhow::bail!(
            "{} generated file(s) are on disk but missing from the project index; \
             `splice media retry --project {}` indexes them",
            stranded.len(),
            batch.project
        );
    }
    if report.succeeded.is_empty() && !report.failed.is_empty() {
        anyhow::bail!("No model produced a result");
    }
    Ok(())
}

fn print_progress(event: ProgressEvent) {
    match event.status {
        ModelStatus::Failed => eprintln!("[{}] failed: {}", event.model_id, event.message),
        _ => eprintln!(
            "[{}] {} {}% {}",
            event.model_id, event.status, event.progress_percent, event.message
        ),
    }
}

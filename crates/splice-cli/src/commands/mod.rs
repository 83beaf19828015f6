//! CLI command implementations

pub mod export;
pub mod generate;
pub mod jobs;
pub mod media;
pub mod models;

use anyhow::Result;
use splice_core::ProjectId;
use splice_gen::{ModelCatalog, SpliceConfig};
use splice_media::{BlobStore, Fetcher, HttpFetcher, IndexStore, MediaRegistry, TomlIndexStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Loaded configuration plus the registry every command works against
pub struct Session {
    pub config: SpliceConfig,
    pub projects_root: PathBuf,
    pub registry: Arc<MediaRegistry>,
    pub fetcher: Arc<dyn Fetcher>,
}

impl Session {
    pub fn open() -> Result<Self> {
        let config = SpliceConfig::load()?;
        let projects_root = config.projects_root();
        let index: Arc<dyn IndexStore> = Arc::new(TomlIndexStore::new(&projects_root));
        let registry = Arc::new(MediaRegistry::new(index, Arc::new(BlobStore::new())));
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::default());

        Ok(Self {
            config,
            projects_root,
            registry,
            fetcher,
        })
    }
}

/// Catalog from `[models] catalog`, or the bundled one
pub fn load_catalog(config: &SpliceConfig) -> Result<ModelCatalog> {
    let catalog = match &config.models.catalog {
        Some(path) => ModelCatalog::load_from_file(path)?,
        None => ModelCatalog::bundled()?,
    };
    Ok(catalog)
}

pub fn project_id(raw: &str) -> Result<ProjectId> {
    ProjectId::new(raw).map_err(|e| anyhow::anyhow!("{}", e))
}

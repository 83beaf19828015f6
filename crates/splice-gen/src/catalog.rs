//! Model catalog
//!
//! The bundled catalog is compiled in from `models.toml`; a project may point
//! `[models] catalog` at its own file instead.

use crate::capability::{combine, CombinedCapabilities, ModelCapabilities};
use serde::{Deserialize, Serialize};
use splice_core::{Result, SpliceError};
use splice_media::MediaType;
use std::collections::HashSet;
use std::path::Path;

const BUNDLED_CATALOG: &str = include_str!("../models.toml");

/// One generation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    /// Config key used to look up credentials
    pub provider: String,
    pub endpoint: String,
    pub media: MediaType,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

/// Validated, immutable set of models
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Catalog shipped with the binary
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_CATALOG)
    }

    /// Load a catalog file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| {
            SpliceError::ConfigError(format!("Invalid catalog {}: {}", path.display(), e))
        })
    }

    /// Parse and validate catalog TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)?;
        Self::from_models(file.models)
    }

    pub fn from_models(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for model in &models {
            if model.id.trim().is_empty() {
                return Err(SpliceError::ConfigError("Model with empty id".to_string()));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(SpliceError::ConfigError(format!(
                    "Duplicate model id '{}'",
                    model.id
                )));
            }
            if !(model.endpoint.starts_with("http://") || model.endpoint.starts_with("https://")) {
                return Err(SpliceError::ConfigError(format!(
                    "Model '{}' endpoint must be an http(s) URL",
                    model.id
                )));
            }
            model.capabilities.validate().map_err(|e| {
                SpliceError::ConfigError(format!("Model '{}': {}", model.id, e))
            })?;
        }
        Ok(Self { models })
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Look up every id, failing on the first unknown one
    pub fn select(&self, ids: &[String]) -> Result<Vec<&ModelDescriptor>> {
        ids.iter()
            .map(|id| {
                self.get(id)
                    .ok_or_else(|| SpliceError::NotFound(format!("Unknown model '{}'", id)))
            })
            .collect()
    }

    /// Combined capabilities of the given selection
    pub fn combined(&self, ids: &[String]) -> Result<CombinedCapabilities> {
        let selected = self.select(ids)?;
        let caps: Vec<&ModelCapabilities> = selected.iter().map(|m| &m.capabilities).collect();
        Ok(combine(&caps))
    }
}

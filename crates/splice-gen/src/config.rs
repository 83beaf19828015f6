//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `SPLICE_{PROVIDER}_API_KEY`, `SPLICE_DATA_DIR`
//! 2. Project-local: `.splice/config.toml`
//! 3. Global: `~/.splice/config.toml`

use crate::transport::TransportPolicy;
use serde::{Deserialize, Serialize};
use splice_core::{Result, SpliceError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Providers whose keys may come from the environment even when no config
/// file mentions them
const KNOWN_PROVIDERS: [&str; 1] = ["fal"];

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Replaces scheme and host of every endpoint of this provider
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Channel selection, timeouts and polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_true")]
    pub prefer_privileged: bool,
    #[serde(default = "default_true")]
    pub allow_fallback: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_initial")]
    pub poll_initial_ms: u64,
    #[serde(default = "default_poll_max")]
    pub poll_max_ms: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Host bridge executable for the privileged channel
    #[serde(default)]
    pub bridge: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            prefer_privileged: true,
            allow_fallback: true,
            request_timeout_secs: default_request_timeout(),
            poll_initial_ms: default_poll_initial(),
            poll_max_ms: default_poll_max(),
            poll_timeout_secs: default_poll_timeout(),
            bridge: None,
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}
fn default_poll_initial() -> u64 {
    1000
}
fn default_poll_max() -> u64 {
    10_000
}
fn default_poll_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".splice")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Alternative catalog file; the bundled one is used when unset
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

/// One config file. Keys a file leaves out inherit from lower layers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpliceConfigFile {
    #[serde(default)]
    pub providers: HashMap<String, ProviderLayer>,
    #[serde(default)]
    pub transport: TransportLayer,
    #[serde(default)]
    pub storage: StorageLayer,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderLayer {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportLayer {
    pub prefer_privileged: Option<bool>,
    pub allow_fallback: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub poll_initial_ms: Option<u64>,
    pub poll_max_ms: Option<u64>,
    pub poll_timeout_secs: Option<u64>,
    pub bridge: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageLayer {
    pub data_dir: Option<PathBuf>,
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default)]
pub struct SpliceConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub models: ModelsConfig,
}

impl SpliceConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                config.apply(Self::load_file(&global_path)?);
            }
        }

        let local_path = PathBuf::from(".splice/config.toml");
        if local_path.exists() {
            config.apply(Self::load_file(&local_path)?);
        }

        config.apply_env_overrides();
        tracing::debug!(data_dir = %config.storage.data_dir.display(), "configuration loaded");
        Ok(config)
    }

    /// Load config from a specific file path only (plus env overrides)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::load_layers(&[path])
    }

    /// Load several files in increasing precedence, then env overrides
    pub fn load_layers(paths: &[&Path]) -> Result<Self> {
        let mut config = Self::default();
        for path in paths {
            config.apply(Self::load_file(path)?);
        }
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_key.as_deref())
    }

    pub fn api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_url.as_deref())
    }

    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.providers
            .get(provider_name)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }

    /// Directory holding one subdirectory per project
    pub fn projects_root(&self) -> PathBuf {
        self.storage.data_dir.join("projects")
    }

    pub fn transport_policy(&self) -> TransportPolicy {
        let t = &self.transport;
        TransportPolicy {
            prefer_privileged: t.prefer_privileged,
            request_timeout: Duration::from_secs(t.request_timeout_secs.max(1)),
            poll_initial: Duration::from_millis(t.poll_initial_ms.max(1)),
            poll_max: Duration::from_millis(t.poll_max_ms.max(t.poll_initial_ms).max(1)),
            poll_timeout: Duration::from_secs(t.poll_timeout_secs),
        }
    }

    /// Endpoint for a provider's model, with `api_url` applied if set
    pub fn endpoint_for(&self, provider_name: &str, endpoint: &str) -> String {
        match self.api_url(provider_name) {
            Some(base) => rebase_url(endpoint, base),
            None => endpoint.to_string(),
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".splice").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<SpliceConfigFile> {
        let content = std::fs::read_to_string(path)?;
        let config: SpliceConfigFile = toml::from_str(&content).map_err(|e| {
            SpliceError::ConfigError(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Overlay the keys `layer` sets
    fn apply(&mut self, layer: SpliceConfigFile) {
        for (name, provider) in layer.providers {
            let entry = self.providers.entry(name).or_default();
            if let Some(key) = provider.api_key {
                entry.api_key = Some(key);
            }
            if let Some(url) = provider.api_url {
                entry.api_url = Some(url);
            }
            if let Some(enabled) = provider.enabled {
                entry.enabled = enabled;
            }
        }

        let t = layer.transport;
        let base = &mut self.transport;
        if let Some(v) = t.prefer_privileged {
            base.prefer_privileged = v;
        }
        if let Some(v) = t.allow_fallback {
            base.allow_fallback = v;
        }
        if let Some(v) = t.request_timeout_secs {
            base.request_timeout_secs = v;
        }
        if let Some(v) = t.poll_initial_ms {
            base.poll_initial_ms = v;
        }
        if let Some(v) = t.poll_max_ms {
            base.poll_max_ms = v;
        }
        if let Some(v) = t.poll_timeout_secs {
            base.poll_timeout_secs = v;
        }
        if t.bridge.is_some() {
            base.bridge = t.bridge;
        }

        if let Some(dir) = layer.storage.data_dir {
            self.storage.data_dir = dir;
        }
        if layer.models.catalog.is_some() {
            self.models.catalog = layer.models.catalog;
        }
    }

    fn apply_env_overrides(&mut self) {
        let mut names: Vec<String> = KNOWN_PROVIDERS.iter().map(|s| s.to_string()).collect();
        names.extend(self.providers.keys().cloned());
        names.sort();
        names.dedup();

        for name in names {
            let env_key = format!("SPLICE_{}_API_KEY", name.to_uppercase().replace('-', "_"));
            if let Ok(key) = std::env::var(&env_key) {
                let entry = self.providers.entry(name).or_default();
                entry.api_key = Some(key);
            }
        }

        if let Ok(dir) = std::env::var("SPLICE_DATA_DIR") {
            if !dir.is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
    }
}

/// Swap the scheme and authority of `url` for `base`, keeping the path
fn rebase_url(url: &str, base: &str) -> String {
    let path = url
        .split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("");
    format!("{}{}", base.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_config(content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splice_config_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_load_config_from_file() {
        let config_str = r#"
[providers.acme]
api_key = "test-key-123"
api_url = "http://localhost:8080"
enabled = true

[providers.other]
enabled = false

[transport]
allow_fallback = false
poll_max_ms = 4000

[models]
catalog = "my-models.toml"
"#;
        let path = temp_config(config_str);
        let config = SpliceConfig::load_from_file(&path).unwrap();

        assert!(config.is_enabled("acme"));
        assert!(!config.is_enabled("other"));
        assert_eq!(config.api_key("acme"), Some("test-key-123"));
        assert!(!config.transport.allow_fallback);
        assert!(config.transport.prefer_privileged);
        assert_eq!(config.transport_policy().poll_max, Duration::from_millis(4000));
        assert_eq!(config.models.catalog, Some(PathBuf::from("my-models.toml")));

        cleanup(&path);
    }

    #[test]
    fn test_layer_precedence() {
        let global = temp_config(
            r#"
[providers.acme]
api_key = "global-key"
api_url = "https://global.example.com"

[transport]
request_timeout_secs = 30
poll_timeout_secs = 60

[storage]
data_dir = "/srv/splice"
"#,
        );
        let project = temp_config(
            r#"
[providers.acme]
api_key = "project-key"

[transport]
poll_timeout_secs = 90
"#,
        );

        let config = SpliceConfig::load_layers(&[global.as_path(), project.as_path()]).unwrap();
        assert_eq!(config.api_key("acme"), Some("project-key"));
        assert_eq!(config.api_url("acme"), Some("https://global.example.com"));
        assert_eq!(config.transport.request_timeout_secs, 30);
        assert_eq!(config.transport.poll_timeout_secs, 90);
        assert_eq!(config.projects_root(), PathBuf::from("/srv/splice/projects"));

        cleanup(&global);
        cleanup(&project);
    }

    #[test]
    fn test_later_layer_can_restore_default_and_omitted_keys_inherit() {
        let global = temp_config(
            r#"
[providers.fal]
enabled = false

[providers.acme]
api_key = "acme-key"

[transport]
allow_fallback = false
prefer_privileged = false
poll_initial_ms = 250
"#,
        );
        let project = temp_config(
            r#"
[providers.fal]
api_key = "project-key"

[providers.acme]
enabled = false

[transport]
allow_fallback = true
poll_initial_ms = 1000
"#,
        );

        let config = SpliceConfig::load_layers(&[global.as_path(), project.as_path()]).unwrap();
        assert!(config.transport.allow_fallback);
        assert_eq!(config.transport.poll_initial_ms, 1000);
        assert!(!config.transport.prefer_privileged);
        assert!(!config.is_enabled("fal"));
        assert_eq!(config.api_key("fal"), Some("project-key"));
        assert!(!config.is_enabled("acme"));
        assert_eq!(config.api_key("acme"), Some("acme-key"));

        let reversed = SpliceConfig::load_layers(&[project.as_path(), global.as_path()]).unwrap();
        assert!(!reversed.transport.allow_fallback);
        assert_eq!(reversed.transport.poll_initial_ms, 250);
        assert!(!reversed.is_enabled("fal"));
        assert!(!reversed.is_enabled("acme"));

        cleanup(&global);
        cleanup(&project);
    }

    #[test]
    fn test_provider_without_enabled_key_stays_enabled() {
        let path = temp_config(
            r#"
[providers.acme]
api_key = "k"
"#,
        );
        let config = SpliceConfig::load_from_file(&path).unwrap();
        assert!(config.is_enabled("acme"));
        cleanup(&path);
    }

    #[test]
    fn test_env_var_override() {
        let path = temp_config(
            r#"
[providers.envtest-provider]
api_key = "file-key"
"#,
        );

        std::env::set_var("SPLICE_ENVTEST_PROVIDER_API_KEY", "env-key-override");
        let config = SpliceConfig::load_from_file(&path).unwrap();
        std::env::remove_var("SPLICE_ENVTEST_PROVIDER_API_KEY");

        assert_eq!(config.api_key("envtest-provider"), Some("env-key-override"));
        cleanup(&path);
    }

    #[test]
    fn test_defaults() {
        let config = SpliceConfig::default();
        assert_eq!(config.api_key("nonexistent"), None);
        assert!(config.is_enabled("nonexistent"));
        assert!(config.transport.allow_fallback);

        let policy = config.transport_policy();
        assert_eq!(policy.poll_initial, Duration::from_millis(1000));
        assert_eq!(policy.poll_max, Duration::from_millis(10_000));
        assert_eq!(policy.poll_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_endpoint_rebase() {
        let mut config = SpliceConfig::default();
        config.providers.insert(
            "fal".to_string(),
            ProviderConfig {
                api_url: Some("http://127.0.0.1:9000/".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            config.endpoint_for("fal", "https://queue.fal.run/fal-ai/flux/dev"),
            "http://127.0.0.1:9000/fal-ai/flux/dev"
        );
        assert_eq!(
            config.endpoint_for("other", "https://queue.fal.run/x"),
            "https://queue.fal.run/x"
        );
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let path = temp_config("[transport\n");
        let err = SpliceConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, SpliceError::ConfigError(_)));
        cleanup(&path);
    }
}

//! Remote byte fetching

use splice_core::{Result, SpliceError};
use std::io::Read;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Fetches the bytes behind a remote URI
pub trait Fetcher: Send + Sync {
    /// Fetch `uri`. Any non-success response is an error; an empty body is
    /// returned as-is so callers can decide whether that is acceptable.
    fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP(S) fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        config.into()
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            return Err(SpliceError::TransportError(format!(
                "Cannot fetch '{}': only http(s) URIs are remote",
                uri
            )));
        }

        let response = self.build_agent().get(uri).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => {
                SpliceError::TransportError(format!("GET {} returned HTTP {}", uri, code))
            }
            other => SpliceError::TransportError(format!("GET {} failed: {}", uri, other)),
        })?;

        let mut reader = response.into_body().into_reader();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|e| {
            SpliceError::TransportError(format!("Failed to read body of {}: {}", uri, e))
        })?;
        tracing::debug!(uri, bytes = bytes.len(), "fetched remote bytes");
        Ok(bytes)
    }
}

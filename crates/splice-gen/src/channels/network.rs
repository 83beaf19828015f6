//! Plain HTTP channel

use crate::transport::{Channel, ChannelKind, ChannelResponse, ModelTarget, TransportError};
use serde_json::Value;
use std::time::Duration;

/// Talks to the service directly over HTTP(S).
///
/// Non-success statuses are not errors here: the raw status and body are
/// handed to normalization so validation bodies survive intact.
#[derive(Debug, Clone, Default)]
pub struct NetworkChannel;

impl NetworkChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Channel for NetworkChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Network
    }

    fn submit(
        &self,
        target: &ModelTarget,
        payload: &Value,
        timeout: Duration,
    ) -> Result<ChannelResponse, TransportError> {
        let agent = build_agent(timeout);
        let mut request = agent
            .post(&target.endpoint)
            .header("Content-Type", "application/json");
        if let Some(key) = &target.api_key {
            request = request.header("Authorization", &format!("Key {}", key));
        }

        let response = request
            .send_json(payload)
            .map_err(|e| map_error(e, "POST", &target.endpoint, timeout))?;
        read_raw(response, &target.endpoint)
    }

    fn poll(
        &self,
        target: &ModelTarget,
        status_url: &str,
        timeout: Duration,
    ) -> Result<ChannelResponse, TransportError> {
        let agent = build_agent(timeout);
        let mut request = agent.get(status_url);
        if let Some(key) = &target.api_key {
            request = request.header("Authorization", &format!("Key {}", key));
        }

        let response = request
            .call()
            .map_err(|e| map_error(e, "GET", status_url, timeout))?;
        read_raw(response, status_url)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    config.into()
}

fn read_raw(
    mut response: ureq::http::Response<ureq::Body>,
    url: &str,
) -> Result<ChannelResponse, TransportError> {
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| TransportError::Network(format!("Failed to read body of {}: {}", url, e)))?;
    Ok(ChannelResponse::Raw { status, body })
}

fn map_error(e: ureq::Error, method: &str, url: &str, timeout: Duration) -> TransportError {
    match e {
        ureq::Error::Timeout(_) => TransportError::Timeout {
            channel: ChannelKind::Network,
            secs: timeout.as_secs(),
        },
        other => TransportError::Network(format!("{} {} failed: {}", method, url, other)),
    }
}

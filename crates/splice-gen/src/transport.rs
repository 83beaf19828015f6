//! Transport layer
//!
//! Sends a sanitized request over the privileged host channel or the plain
//! network channel and resolves whatever the service answers (immediate
//! result, queued job, failure) into a single [`GenerationOutcome`].
//! Job polling happens here so callers never see intermediate states.

use crate::capability::GenerationRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use splice_core::SpliceError;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting between polls
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Which channel carried a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Privileged,
    Network,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Privileged => write!(f, "privileged"),
            ChannelKind::Network => write!(f, "network"),
        }
    }
}

/// Where and how to reach one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTarget {
    pub model_id: String,
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl ModelTarget {
    /// Poll URL used when the service did not hand one back
    pub fn job_status_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}", self.endpoint.trim_end_matches('/'), job_id)
    }
}

/// A channel's native reply, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelResponse {
    /// Already-decoded JSON (privileged bridge)
    Decoded(Value),
    /// Raw HTTP status and body text (network)
    Raw { status: u16, body: String },
}

/// One way of reaching the generation service
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    fn is_available(&self) -> bool {
        true
    }

    fn submit(
        &self,
        target: &ModelTarget,
        payload: &Value,
        timeout: Duration,
    ) -> Result<ChannelResponse, TransportError>;

    fn poll(
        &self,
        target: &ModelTarget,
        status_url: &str,
        timeout: Duration,
    ) -> Result<ChannelResponse, TransportError>;
}

/// Failures of a single generation attempt at the transport level
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("{0} channel is unavailable")]
    Unavailable(ChannelKind),

    #[error("{channel} request timed out after {secs}s")]
    Timeout { channel: ChannelKind, secs: u64 },

    #[error("{0}")]
    Network(String),

    #[error("service rejected the request (HTTP {status}){}: {body}", rejection_hint(.field, .allowed))]
    Rejected {
        status: u16,
        field: Option<String>,
        allowed: Vec<String>,
        /// Service body, verbatim
        body: String,
    },

    #[error("service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unexpected service response: {0}")]
    Malformed(String),

    #[error("service reported failure: {0}")]
    Service(String),

    #[error("job {job_id} did not finish within {secs}s")]
    PollTimeout { job_id: String, secs: u64 },

    #[error("cancelled")]
    Cancelled,
}

fn rejection_hint(field: &Option<String>, allowed: &[String]) -> String {
    match (field, allowed.is_empty()) {
        (Some(f), false) => format!(", {} must be one of [{}]", f, allowed.join(", ")),
        (Some(f), true) => format!(", invalid {}", f),
        (None, false) => format!(", allowed values [{}]", allowed.join(", ")),
        (None, true) => String::new(),
    }
}

impl From<TransportError> for SpliceError {
    fn from(e: TransportError) -> Self {
        SpliceError::TransportError(e.to_string())
    }
}

/// Result properties the service reported, if any
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Normalized service state
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Ready {
        remote_uri: String,
        metadata: OutcomeMetadata,
    },
    Polling {
        job_id: String,
        progress: Option<u8>,
        status_url: Option<String>,
    },
    Failed {
        reason: String,
    },
}

/// Final result of one model's attempt
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Ready {
        remote_uri: String,
        metadata: OutcomeMetadata,
        job_id: Option<String>,
        channel: ChannelKind,
    },
    Failed {
        reason: TransportError,
    },
}

/// Map either native reply shape onto [`JobState`]
pub fn normalize(response: ChannelResponse) -> Result<JobState, TransportError> {
    match response {
        ChannelResponse::Decoded(value) => decode_state(&value),
        ChannelResponse::Raw { status, body } => {
            if !(200..300).contains(&status) {
                return Err(http_error(status, body));
            }
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| TransportError::Malformed(format!("{}: {}", e, excerpt(&body))))?;
            decode_state(&value)
        }
    }
}

/// Classify a non-success HTTP reply, keeping the body verbatim
pub fn http_error(status: u16, body: String) -> TransportError {
    let rejection = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| find_rejection(&v));
    match rejection {
        Some((field, allowed)) => TransportError::Rejected {
            status,
            field,
            allowed,
            body,
        },
        None => TransportError::Http { status, body },
    }
}

fn find_rejection(value: &Value) -> Option<(Option<String>, Vec<String>)> {
    if let Some(found) = rejection_in(value) {
        return Some(found);
    }
    if let Some(found) = value.get("error").and_then(rejection_in) {
        return Some(found);
    }
    value
        .get("detail")
        .and_then(Value::as_array)
        .and_then(|details| details.iter().find_map(rejection_in))
}

fn rejection_in(value: &Value) -> Option<(Option<String>, Vec<String>)> {
    let obj = value.as_object()?;
    if !obj.contains_key("field") && !obj.contains_key("allowed") {
        return None;
    }
    let field = obj.get("field").and_then(value_text);
    let allowed = match obj.get("allowed") {
        Some(Value::Array(values)) => values.iter().filter_map(value_text).collect(),
        Some(other) => value_text(other).into_iter().collect(),
        None => Vec::new(),
    };
    Some((field, allowed))
}

fn decode_state(value: &Value) -> Result<JobState, TransportError> {
    let status = text_field(value, &["status", "state"]).map(|s| s.to_ascii_lowercase());

    if matches!(
        status.as_deref(),
        Some("failed" | "error" | "cancelled" | "canceled")
    ) {
        return Ok(JobState::Failed {
            reason: failure_reason(value),
        });
    }

    if let Some(remote_uri) = result_uri(value) {
        return Ok(JobState::Ready {
            remote_uri,
            metadata: outcome_metadata(value),
        });
    }

    if let Some(job_id) = text_field(value, &["job_id", "jobId", "request_id", "requestId"]) {
        if matches!(status.as_deref(), Some("completed" | "succeeded" | "success")) {
            return Err(TransportError::Malformed(format!(
                "job {} completed without a result uri",
                job_id
            )));
        }
        return Ok(JobState::Polling {
            job_id,
            progress: value.get("progress").and_then(percent),
            status_url: text_field(value, &["status_url", "statusUrl"]),
        });
    }

    Err(TransportError::Malformed(excerpt(&value.to_string())))
}

fn result_uri(value: &Value) -> Option<String> {
    text_field(value, &["result_uri", "resultUri", "url", "video_url"]).or_else(|| {
        ["/video/url", "/image/url", "/images/0/url", "/audio/url", "/output/url"]
            .iter()
            .find_map(|p| value.pointer(p).and_then(value_text))
    })
}

fn outcome_metadata(value: &Value) -> OutcomeMetadata {
    let sources: Vec<&Value> = [value.get("metadata"), value.get("video"), Some(value)]
        .into_iter()
        .flatten()
        .collect();
    let number = |keys: &[&str]| {
        sources
            .iter()
            .find_map(|src| keys.iter().find_map(|k| src.get(*k).and_then(Value::as_f64)))
    };
    let text = |keys: &[&str]| sources.iter().find_map(|src| text_field(src, keys));

    OutcomeMetadata {
        duration: number(&["duration"]),
        width: number(&["width"]).map(|w| w as u32),
        height: number(&["height"]).map(|h| h as u32),
        frame_rate: number(&["frame_rate", "fps"]),
        content_type: text(&["content_type", "contentType"]),
    }
}

fn failure_reason(value: &Value) -> String {
    for key in ["error", "message", "detail"] {
        match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Object(obj)) => {
                if let Some(msg) = obj.get("message").and_then(value_text) {
                    return msg;
                }
            }
            _ => {}
        }
    }
    "no reason given".to_string()
}

fn percent(value: &Value) -> Option<u8> {
    value.as_f64().map(|p| p.clamp(0.0, 100.0).round() as u8)
}

fn text_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(value_text))
        .filter(|s| !s.is_empty())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Timeouts and polling bounds
#[derive(Debug, Clone, PartialEq)]
pub struct TransportPolicy {
    pub prefer_privileged: bool,
    pub request_timeout: Duration,
    pub poll_initial: Duration,
    pub poll_max: Duration,
    /// Overall deadline for a queued job, measured from submission
    pub poll_timeout: Duration,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            prefer_privileged: true,
            request_timeout: Duration::from_secs(120),
            poll_initial: Duration::from_millis(1000),
            poll_max: Duration::from_millis(10_000),
            poll_timeout: Duration::from_secs(600),
        }
    }
}

/// Double the delay, capped at `max`
pub fn next_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Hooks into an in-flight attempt
pub trait PollObserver: Sync {
    /// The service accepted the request
    fn on_accepted(&self, _channel: ChannelKind, _job_id: Option<&str>) {}

    /// A queued job reported progress
    fn on_progress(&self, _job_id: &str, _progress: Option<u8>) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Observer that ignores everything
pub struct Unobserved;

impl PollObserver for Unobserved {}

/// Channel selection, single fallback and job polling
pub struct Transport {
    privileged: Option<Arc<dyn Channel>>,
    network: Arc<dyn Channel>,
    policy: TransportPolicy,
}

impl Transport {
    pub fn new(network: Arc<dyn Channel>, policy: TransportPolicy) -> Self {
        Self {
            privileged: None,
            network,
            policy,
        }
    }

    pub fn with_privileged(mut self, channel: Arc<dyn Channel>) -> Self {
        self.privileged = Some(channel);
        self
    }

    pub fn policy(&self) -> &TransportPolicy {
        &self.policy
    }

    /// Submit `request` and follow it to a final outcome.
    ///
    /// With `allow_fallback` set, a failed privileged call is retried once
    /// over the network channel with the same payload. Nothing else is
    /// retried, and a queued job is only polled through the channel that
    /// accepted it.
    pub fn send(
        &self,
        target: &ModelTarget,
        request: &GenerationRequest,
        allow_fallback: bool,
        observer: &dyn PollObserver,
    ) -> GenerationOutcome {
        let payload = request.payload();
        let timeout = self.policy.request_timeout;
        tracing::debug!(model = %target.model_id, endpoint = %target.endpoint, "submitting generation request");

        match self.dispatch(allow_fallback, |channel| channel.submit(target, &payload, timeout)) {
            Ok((state, channel)) => self.follow(target, state, channel, observer),
            Err(reason) => GenerationOutcome::Failed { reason },
        }
    }

    fn dispatch<F>(&self, allow_fallback: bool, call: F) -> Result<(JobState, ChannelKind), TransportError>
    where
        F: Fn(&dyn Channel) -> Result<ChannelResponse, TransportError>,
    {
        let privileged = self
            .privileged
            .as_deref()
            .filter(|channel| self.policy.prefer_privileged && channel.is_available());

        if let Some(channel) = privileged {
            match call(channel).and_then(normalize) {
                Ok(state) => return Ok((state, channel.kind())),
                Err(e) if allow_fallback => {
                    tracing::warn!(error = %e, "privileged channel failed, retrying over network");
                }
                Err(e) => return Err(e),
            }
        }

        let channel = self.network.as_ref();
        let state = call(channel).and_then(normalize)?;
        Ok((state, channel.kind()))
    }

    fn channel(&self, kind: ChannelKind) -> &dyn Channel {
        match (kind, self.privileged.as_deref()) {
            (ChannelKind::Privileged, Some(channel)) => channel,
            _ => self.network.as_ref(),
        }
    }

    /// Poll a queued job to completion through the channel that accepted it
    fn follow(
        &self,
        target: &ModelTarget,
        mut state: JobState,
        channel: ChannelKind,
        observer: &dyn PollObserver,
    ) -> GenerationOutcome {
        let started = Instant::now();
        let mut delay = self.policy.poll_initial;
        let mut job: Option<String> = None;
        let mut status_url: Option<String> = None;

        if let JobState::Polling { job_id, .. } = &state {
            observer.on_accepted(channel, Some(job_id));
        } else {
            observer.on_accepted(channel, None);
        }

        loop {
            match state {
                JobState::Ready {
                    remote_uri,
                    metadata,
                } => {
                    return GenerationOutcome::Ready {
                        remote_uri,
                        metadata,
                        job_id: job,
                        channel,
                    }
                }
                JobState::Failed { reason } => {
                    return GenerationOutcome::Failed {
                        reason: TransportError::Service(reason),
                    }
                }
                JobState::Polling {
                    job_id,
                    progress,
                    status_url: reported_url,
                } => {
                    observer.on_progress(&job_id, progress);
                    if reported_url.is_some() {
                        status_url = reported_url;
                    }
                    let url = status_url
                        .clone()
                        .unwrap_or_else(|| target.job_status_url(&job_id));

                    if let Err(reason) = self.wait(delay, started, &job_id, observer) {
                        return GenerationOutcome::Failed { reason };
                    }
                    delay = next_delay(delay, self.policy.poll_max);
                    tracing::debug!(model = %target.model_id, job = %job_id, "polling job");

                    let timeout = self.policy.request_timeout;
                    job = Some(job_id);
                    match self.channel(channel).poll(target, &url, timeout).and_then(normalize) {
                        Ok(next) => state = next,
                        Err(reason) => return GenerationOutcome::Failed { reason },
                    }
                }
            }
        }
    }

    /// Sleep `delay` unless cancelled or past the poll deadline
    fn wait(
        &self,
        delay: Duration,
        started: Instant,
        job_id: &str,
        observer: &dyn PollObserver,
    ) -> Result<(), TransportError> {
        let deadline = started + self.policy.poll_timeout;
        let wake = Instant::now() + delay;
        loop {
            if observer.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::PollTimeout {
                    job_id: job_id.to_string(),
                    secs: self.policy.poll_timeout.as_secs(),
                });
            }
            if now >= wake {
                return Ok(());
            }
            thread::sleep((wake.min(deadline) - now).min(CANCEL_CHECK_INTERVAL));
        }
    }
}

//! Privileged host channel
//!
//! Requests go through a host bridge (a helper process with its own network
//! stack and credentials) instead of the process's HTTP client. The bridge
//! answers with decoded JSON, optionally wrapped in an
//! `{"ok": bool, "status": u16, "body": ...}` envelope when it forwards an
//! HTTP reply.

use crate::transport::{Channel, ChannelKind, ChannelResponse, ModelTarget, TransportError};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const SUBMIT_COMMAND: &str = "generation:submit";
pub const POLL_COMMAND: &str = "generation:poll";

/// Host-side command executor
pub trait HostBridge: Send + Sync {
    fn is_available(&self) -> bool;

    fn invoke(&self, command: &str, payload: &Value, timeout: Duration)
        -> Result<Value, TransportError>;
}

/// [`Channel`] over a [`HostBridge`]
pub struct PrivilegedChannel {
    bridge: Arc<dyn HostBridge>,
}

impl PrivilegedChannel {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self { bridge }
    }

    fn call(&self, command: &str, payload: Value, timeout: Duration) -> Result<ChannelResponse, TransportError> {
        if !self.bridge.is_available() {
            return Err(TransportError::Unavailable(ChannelKind::Privileged));
        }
        let reply = self.bridge.invoke(command, &payload, timeout)?;
        Ok(unwrap_envelope(reply))
    }
}

impl Channel for PrivilegedChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Privileged
    }

    fn is_available(&self) -> bool {
        self.bridge.is_available()
    }

    fn submit(
        &self,
        target: &ModelTarget,
        payload: &Value,
        timeout: Duration,
    ) -> Result<ChannelResponse, TransportError> {
        self.call(
            SUBMIT_COMMAND,
            json!({
                "model_id": target.model_id,
                "endpoint": target.endpoint,
                "api_key": target.api_key,
                "payload": payload,
            }),
            timeout,
        )
    }

    fn poll(
        &self,
        target: &ModelTarget,
        status_url: &str,
        timeout: Duration,
    ) -> Result<ChannelResponse, TransportError> {
        self.call(
            POLL_COMMAND,
            json!({
                "model_id": target.model_id,
                "url": status_url,
                "api_key": target.api_key,
            }),
            timeout,
        )
    }
}

/// Forwarded HTTP failures become raw responses so they normalize the same
/// way as network replies.
fn unwrap_envelope(reply: Value) -> ChannelResponse {
    let Some(ok) = reply.get("ok").and_then(Value::as_bool) else {
        return ChannelResponse::Decoded(reply);
    };
    let body = reply
        .get("body")
        .or_else(|| reply.get("data"))
        .cloned()
        .unwrap_or(Value::Null);
    if ok {
        return ChannelResponse::Decoded(body);
    }
    let status = reply
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(502);
    let body = match body {
        Value::String(text) => text,
        other => other.to_string(),
    };
    ChannelResponse::Raw { status, body }
}

/// Bridge backed by a helper executable.
///
/// Invoked as `<program> <command>` with the JSON payload on stdin; the
/// reply is read as JSON from stdout. A non-zero exit, or exiting before the
/// whole payload was read, is a bridge failure.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    program: PathBuf,
}

impl CommandBridge {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl HostBridge for CommandBridge {
    fn is_available(&self) -> bool {
        self.program.is_file()
    }

    fn invoke(&self, command: &str, payload: &Value, timeout: Duration) -> Result<Value, TransportError> {
        let bridge_error = |msg: String| TransportError::Network(format!("host bridge: {}", msg));

        let mut child = Command::new(&self.program)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| bridge_error(format!("failed to start {}: {}", self.program.display(), e)))?;

        // A helper blocked on a full pipe never exits, so every pipe gets its own thread.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let body = payload.to_string();
        let writer = child
            .stdin
            .take()
            .map(|mut stdin| thread::spawn(move || stdin.write_all(body.as_bytes())));

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(TransportError::Timeout {
                        channel: ChannelKind::Privileged,
                        secs: timeout.as_secs(),
                    });
                }
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(bridge_error(e.to_string()));
                }
            }
        };

        // The child has been reaped, so every pipe is closed and these joins return.
        let sent = match writer {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::new(std::io::ErrorKind::Other, "payload writer panicked"))),
            None => Ok(()),
        };
        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();

        let status = status?;
        if !status.success() {
            return Err(bridge_error(format!("{} exited with {}: {}", command, status, err.trim())));
        }
        sent.map_err(|e| bridge_error(format!("failed to send payload: {}", e)))?;

        serde_json::from_str(out.trim())
            .map_err(|e| TransportError::Malformed(format!("host bridge reply: {}", e)))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut out);
        }
        out
    })
}

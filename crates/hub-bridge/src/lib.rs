//! Integration bridge. Manages a subprocess that talks to the real business
//! APIs (Slack, Jobber, Gmail, ...) and to the language model.
//!
//! The hub core is transport-agnostic. This crate supplies the production
//! collaborators by forwarding every call to a helper process over
//! line-delimited JSON on stdin/stdout:
//!
//! - backend commands and health probes (`BackendAdapter`)
//! - business snapshots (`hub/context`)
//! - action decisions (`hub/decide`)
//! - communication analysis and reply drafting (`hub/analyze`, `hub/draftReply`)

mod collaborators;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use hub_protocol::ProtocolError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Configuration for the bridge subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Path to the bridge entry point
    pub script_path: PathBuf,
    /// Runtime to use (bun, node, deno)
    pub runtime: String,
    /// Working directory passed to the bridge
    pub workspace_root: PathBuf,
    /// Upper bound on a single round trip
    pub request_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            script_path: PathBuf::from("hub-bridge/index.ts"),
            runtime: "bun".into(),
            workspace_root: PathBuf::from("."),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to start bridge: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("bridge subprocess has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("bridge is not running")]
    NotRunning,

    #[error("bridge closed before responding")]
    ResponseDropped,

    #[error("bridge did not respond within {0}ms")]
    Timeout(u64),

    #[error("unexpected bridge payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Remote(#[from] ProtocolError),
}

impl From<BridgeError> for ProtocolError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Remote(e) => e,
            BridgeError::Timeout(_) => ProtocolError::timeout(err.to_string()),
            other => ProtocolError::internal(other.to_string()),
        }
    }
}

/// Request line written to the subprocess.
#[derive(Debug, Serialize)]
struct WireRequest {
    id: String,
    method: String,
    params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
}

/// Response line read from the subprocess.
#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ProtocolError>,
}

type Pending = Arc<DashMap<String, oneshot::Sender<Result<Value, ProtocolError>>>>;

struct PendingEntry<'a> {
    pending: &'a Pending,
    id: String,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Multiplexes concurrent requests over one subprocess.
pub struct Bridge {
    /// Channel to the writer task
    request_tx: Mutex<Option<mpsc::Sender<WireRequest>>>,
    pending: Pending,
    child: tokio::sync::Mutex<Option<Child>>,
    next_id: AtomicU64,
    running: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl Bridge {
    /// Start the subprocess and wire up its pipes.
    pub async fn spawn(config: BridgeConfig) -> Result<Self, BridgeError> {
        info!("Starting bridge: {} {}", config.runtime, config.script_path.display());

        let mut child = Command::new(&config.runtime)
            .arg("run")
            .arg(&config.script_path)
            .arg("--workspace")
            .arg(&config.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(BridgeError::Spawn)?;

        let stdin = child.stdin.take().ok_or(BridgeError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(BridgeError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(BridgeError::MissingPipe("stderr"))?;

        // Stderr logger
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[hub-bridge] {line}");
            }
        });

        let bridge = Self::attach(stdout, stdin, Duration::from_millis(config.request_timeout_ms));
        *bridge.child.lock().await = Some(child);
        info!("Bridge started");
        Ok(bridge)
    }

    /// Run the bridge protocol over an arbitrary reader/writer pair.
    pub fn attach<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<WireRequest>(64);
        let pending: Pending = Arc::new(DashMap::new());
        let running = Arc::new(AtomicBool::new(true));

        // Writer task: serializes requests to the subprocess
        let mut writer = writer;
        let writer_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                let mut line = match serde_json::to_string(&req) {
                    Ok(line) => line,
                    Err(e) => {
                        if let Some((_, tx)) = writer_pending.remove(&req.id) {
                            let _ = tx.send(Err(ProtocolError::internal(format!("unserializable request: {e}"))));
                        }
                        continue;
                    }
                };
                line.push('\n');
                if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                    warn!("Bridge stdin closed");
                    break;
                }
            }
        });

        // Reader task: routes responses back to their callers
        let reader_pending = pending.clone();
        let reader_running = running.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<WireResponse>(&line) {
                    Ok(response) => {
                        let Some((_, tx)) = reader_pending.remove(&response.id) else {
                            debug!("Dropping bridge response for unknown id {}", response.id);
                            continue;
                        };
                        let outcome = match response.error {
                            Some(err) => Err(err),
                            None => Ok(response.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    // Log output or notifications from the subprocess
                    Err(_) => debug!("Non-JSON line from bridge: {line}"),
                }
            }
            warn!("Bridge stdout reader ended");
            reader_running.store(false, Ordering::Relaxed);
            // Wake every waiter; their senders drop here.
            reader_pending.clear();
        });

        Self {
            request_tx: Mutex::new(Some(tx)),
            pending,
            child: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
            running,
            request_timeout,
        }
    }

    /// Send one request and wait for its result.
    pub async fn request(&self, method: &str, params: Value, server: Option<&str>) -> Result<Value, BridgeError> {
        let tx = self.request_tx.lock().clone().ok_or(BridgeError::NotRunning)?;
        if !self.is_running() {
            return Err(BridgeError::NotRunning);
        }

        let id = format!("b-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (response_tx, response_rx) = oneshot::channel();
        self.pending.insert(id.clone(), response_tx);
        // Removes the entry however this call ends, including when the
        // caller drops it mid-flight.
        let _pending = PendingEntry {
            pending: &self.pending,
            id: id.clone(),
        };

        let req = WireRequest {
            id: id.clone(),
            method: method.to_string(),
            params,
            server: server.map(str::to_string),
        };
        if tx.send(req).await.is_err() {
            return Err(BridgeError::NotRunning);
        }

        match tokio::time::timeout(self.request_timeout, response_rx).await {
            Ok(Ok(outcome)) => outcome.map_err(BridgeError::Remote),
            Ok(Err(_)) => Err(BridgeError::ResponseDropped),
            Err(_) => Err(BridgeError::Timeout(
                u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// Requests currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop accepting requests and terminate the subprocess.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.request_tx.lock().take();
        self.pending.clear();

        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
            info!("Bridge subprocess terminated");
        }
    }
}

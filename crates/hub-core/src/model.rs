//! Server descriptors and commands, the hub's tracked entities.

use chrono::{DateTime, Utc};
use hub_protocol::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

// ─────────────────────────────────────────────────────────────────────────────
// Servers
// ─────────────────────────────────────────────────────────────────────────────

/// Connectivity of a registered backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one registered backend integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Method names this server accepts.
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Opaque per-server configuration.
    #[serde(default)]
    pub config: Value,
    /// Lower sorts first.
    #[serde(default)]
    pub priority: u32,
}

impl ServerDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let name = name.into();
        Self {
            description: format!("Backend server for {name}"),
            id,
            name,
            capabilities: Vec::new(),
            status: ServerStatus::Disconnected,
            last_heartbeat: None,
            endpoint: None,
            config: Value::Object(Default::default()),
            priority: 0,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn supports(&self, method: &str) -> bool {
        self.capabilities.iter().any(|c| c == method)
    }

    pub fn is_connected(&self) -> bool {
        self.status == ServerStatus::Connected
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Who asked for a command, kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    #[default]
    User,
    Ai,
    Automation,
}

/// One tracked request/outcome pair dispatched to a named backend.
///
/// Status only moves forward (`pending → executing → completed|failed`, or
/// straight from `pending` to `failed` when the command never reached a
/// backend). Once terminal the command is never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub server: String,
    pub method: String,
    pub params: Params,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<HubError>,
    pub initiated_by: Initiator,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl Command {
    pub(crate) fn pending(
        server: impl Into<String>,
        method: impl Into<String>,
        params: Params,
        initiated_by: Initiator,
    ) -> Self {
        Self {
            id: format!("cmd-{}", uuid::Uuid::new_v4()),
            server: server.into(),
            method: method.into(),
            params,
            status: CommandStatus::Pending,
            result: None,
            error: None,
            initiated_by,
            created_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
        }
    }

    pub(crate) fn begin(&mut self) {
        if self.status == CommandStatus::Pending {
            self.status = CommandStatus::Executing;
        }
    }

    pub(crate) fn complete(&mut self, result: Value, elapsed_ms: u64) {
        if self.finish(CommandStatus::Completed, elapsed_ms) {
            self.result = Some(result);
        }
    }

    pub(crate) fn fail(&mut self, error: HubError, elapsed_ms: u64) {
        if self.finish(CommandStatus::Failed, elapsed_ms) {
            self.error = Some(error);
        }
    }

    /// Applies the terminal transition; returns false if already terminal.
    fn finish(&mut self, status: CommandStatus, elapsed_ms: u64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.execution_time_ms = Some(elapsed_ms);
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == CommandStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == CommandStatus::Failed
    }

    /// Human-readable failure description, if the command failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// A single suggested dispatch, as produced by a decision provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(alias = "action")]
    pub server: String,
    pub method: String,
    #[serde(default)]
    pub params: Params,
}

impl Action {
    pub fn new(server: impl Into<String>, method: impl Into<String>, params: Params) -> Self {
        Self {
            server: server.into(),
            method: method.into(),
            params,
        }
    }
}

//! Hub configuration.
//!
//! Loaded from a JSON file (camelCase keys); every field has a default, so
//! `{}` is a valid config that yields the built-in integration list.

use std::path::Path;
use std::time::Duration;

use hub_protocol::default_capabilities;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ServerDescriptor;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubConfig {
    /// Per-command backend timeout.
    pub command_timeout_ms: u64,
    /// Bound on each context/decision provider call.
    pub decision_timeout_ms: u64,
    pub health_check_interval_ms: u64,
    pub enable_heartbeat: bool,
    pub autonomous_interval_ms: u64,
    /// Finished commands kept for `recent_commands`.
    pub history_limit: usize,
    pub servers: Vec<ServerConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            decision_timeout_ms: 30_000,
            health_check_interval_ms: 60_000,
            enable_heartbeat: true,
            autonomous_interval_ms: 3_600_000,
            history_limit: 256,
            servers: default_servers(),
        }
    }
}

impl HubConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn autonomous_interval(&self) -> Duration {
        Duration::from_millis(self.autonomous_interval_ms)
    }

    /// Config with no servers, for embedding and tests.
    pub fn empty() -> Self {
        Self {
            servers: Vec::new(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Empty means the well-known list for `id`.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub config: Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: u32,
}

fn enabled_by_default() -> bool {
    true
}

impl ServerConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: u32) -> Self {
        let id = id.into();
        Self {
            endpoint: Some(format!("/api/mcp/{id}")),
            id,
            name: name.into(),
            capabilities: Vec::new(),
            config: Value::Object(Default::default()),
            enabled: true,
            priority,
        }
    }

    pub fn descriptor(&self) -> ServerDescriptor {
        let capabilities: Vec<String> = if self.capabilities.is_empty() {
            default_capabilities(&self.id).iter().map(|m| m.to_string()).collect()
        } else {
            self.capabilities.clone()
        };

        let mut descriptor = ServerDescriptor::new(&self.id, &self.name)
            .with_capabilities(capabilities)
            .with_priority(self.priority);
        if let Some(endpoint) = &self.endpoint {
            descriptor = descriptor.with_endpoint(endpoint);
        }
        if !self.config.is_null() {
            descriptor = descriptor.with_config(self.config.clone());
        }
        descriptor
    }
}

/// The built-in business integrations.
pub fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::new("slack", "Slack", 1),
        ServerConfig::new("jobber", "Jobber", 1),
        ServerConfig::new("gmail", "Gmail", 2),
        ServerConfig::new("twilio", "Twilio", 2),
        ServerConfig::new("google-calendar", "Google Calendar", 2),
        ServerConfig::new("matterport", "Matterport", 3),
        ServerConfig::new("google-drive", "Google Drive", 3),
    ]
}

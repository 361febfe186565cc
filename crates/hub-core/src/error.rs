//! Hub error taxonomy.
//!
//! Dispatch-level failures never surface as `Err` from
//! [`Dispatcher::execute`](crate::Dispatcher::execute); they are recorded on
//! the terminal [`Command`](crate::Command). Registry misuse and
//! orchestrator/loop internals are returned to the direct caller.

use hub_protocol::{ErrorCode, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HubError {
    #[error("server not found: {server}")]
    ServerNotFound { server: String },

    #[error("server not connected: {server}")]
    ServerNotConnected { server: String },

    #[error("server already registered: {server}")]
    DuplicateServer { server: String },

    #[error("{message}")]
    Backend {
        code: i32,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },

    #[error("backend did not respond within {timeout_ms}ms")]
    BackendTimeout {
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },

    #[error("invalid command: {message}")]
    Validation { message: String },

    #[error("unknown workflow: {name}")]
    UnknownWorkflow { name: String },

    #[error("workflow {name} failed: {message}")]
    Workflow { name: String, message: String },

    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("command cancelled before the backend answered")]
    Cancelled,
}

impl HubError {
    pub fn server_not_found(server: impl Into<String>) -> Self {
        Self::ServerNotFound { server: server.into() }
    }

    pub fn server_not_connected(server: impl Into<String>) -> Self {
        Self::ServerNotConnected { server: server.into() }
    }

    pub fn duplicate_server(server: impl Into<String>) -> Self {
        Self::DuplicateServer { server: server.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { message: message.into() }
    }

    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::BackendTimeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Protocol error code for this error, used when reporting it on the wire.
    pub fn code(&self) -> i32 {
        match self {
            Self::ServerNotFound { .. } => ErrorCode::ServerNotFound.code(),
            Self::ServerNotConnected { .. } => ErrorCode::ServerNotConnected.code(),
            Self::DuplicateServer { .. } => ErrorCode::InvalidRequest.code(),
            Self::Backend { code, .. } => *code,
            Self::BackendTimeout { .. } => ErrorCode::Timeout.code(),
            Self::Validation { .. } => ErrorCode::InvalidParams.code(),
            Self::UnknownWorkflow { .. } => ErrorCode::MethodNotFound.code(),
            Self::Workflow { .. } | Self::Provider { .. } | Self::Cancelled => ErrorCode::ServerError.code(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::BackendTimeout { .. })
    }
}

impl From<ProtocolError> for HubError {
    fn from(err: ProtocolError) -> Self {
        Self::Backend {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

impl From<HubError> for ProtocolError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Backend { code, message, data } => ProtocolError { code, message, data },
            other => ProtocolError {
                code: other.code(),
                message: other.to_string(),
                data: None,
            },
        }
    }
}

//! Backend adapter seam: the hub's only way to reach an integration.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hub_protocol::{Methods, Params, ProtocolError, Request, Response};

/// Boxed future used by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait implemented by every integration the hub can dispatch to.
///
/// Implementations must be safe to call concurrently: the dispatcher and the
/// heartbeat monitor share one adapter per server without serializing calls.
pub trait BackendAdapter: Send + Sync {
    /// Send one correlated request to `server_id` and return its response.
    ///
    /// Transport failures are reported as a [`Response`] carrying an error,
    /// never as a panic.
    fn send(&self, server_id: &str, request: Request) -> impl Future<Output = Response> + Send;

    /// Liveness probe. Healthy iff a `health` request returns
    /// `{"status": "ok"}` without an error.
    fn probe(&self, server_id: &str) -> impl Future<Output = Result<(), ProtocolError>> + Send {
        async move {
            let request = Request::new(
                format!("health-{}", uuid::Uuid::new_v4()),
                Methods::HEALTH,
                Params::new(),
            );
            let result = self.send(server_id, request).await.into_outcome()?;
            match result.get("status").and_then(|s| s.as_str()) {
                Some("ok") => Ok(()),
                other => Err(ProtocolError::server_error(format!(
                    "unhealthy status: {}",
                    other.unwrap_or("missing")
                ))),
            }
        }
    }
}

/// Object-safe wrapper for [`BackendAdapter`] so adapters can be stored as
/// `Arc<dyn BackendAdapterDyn>`.
pub trait BackendAdapterDyn: Send + Sync {
    fn send_dyn<'a>(&'a self, server_id: &'a str, request: Request) -> BoxFuture<'a, Response>;
    fn probe_dyn<'a>(&'a self, server_id: &'a str) -> BoxFuture<'a, Result<(), ProtocolError>>;
}

impl<T: BackendAdapter> BackendAdapterDyn for T {
    fn send_dyn<'a>(&'a self, server_id: &'a str, request: Request) -> BoxFuture<'a, Response> {
        Box::pin(self.send(server_id, request))
    }

    fn probe_dyn<'a>(&'a self, server_id: &'a str) -> BoxFuture<'a, Result<(), ProtocolError>> {
        Box::pin(self.probe(server_id))
    }
}

pub type SharedAdapter = Arc<dyn BackendAdapterDyn>;

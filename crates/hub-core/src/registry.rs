//! ServerRegistry: known backends and their connectivity state machine.
//!
//! Per server: `disconnected → connecting → connected`, or
//! `connecting → error`. A connected server only leaves `connected` through a
//! failed heartbeat or an explicit disconnect.
//!
//! The table sits behind a parking_lot::RwLock that is never held across an
//! await. Every transition bumps a per-entry epoch; a probe result is applied
//! only if the epoch is unchanged when it comes back, so a slow heartbeat
//! can't clobber a newer connect or an explicit disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hub_protocol::ProtocolError;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::adapter::SharedAdapter;
use crate::error::HubError;
use crate::events::{EventNotifier, HubEvent};
use crate::model::{ServerDescriptor, ServerStatus};

/// Internal entry: descriptor plus the adapter that serves it.
struct ServerEntry {
    descriptor: ServerDescriptor,
    adapter: SharedAdapter,
    /// Monitored by heartbeats. Set by `connect`, cleared by `disconnect`.
    active: bool,
    epoch: u64,
}

pub struct ServerRegistry {
    servers: RwLock<HashMap<String, ServerEntry>>,
    events: Arc<EventNotifier>,
    probe_timeout: Duration,
}

impl ServerRegistry {
    pub fn new(events: Arc<EventNotifier>, probe_timeout: Duration) -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            events,
            probe_timeout,
        }
    }

    /// Add a server in `disconnected` state.
    pub fn register(&self, mut descriptor: ServerDescriptor, adapter: SharedAdapter) -> Result<(), HubError> {
        let mut servers = self.servers.write();
        if servers.contains_key(&descriptor.id) {
            return Err(HubError::duplicate_server(&descriptor.id));
        }

        descriptor.status = ServerStatus::Disconnected;
        descriptor.last_heartbeat = None;
        info!("Registered server: {} ({} capabilities)", descriptor.id, descriptor.capabilities.len());
        servers.insert(
            descriptor.id.clone(),
            ServerEntry {
                descriptor,
                adapter,
                active: false,
                epoch: 0,
            },
        );
        Ok(())
    }

    /// Probe the server and mark it `connected` or `error`.
    ///
    /// Returns whether the server ended up connected. An unhealthy backend is
    /// `Ok(false)`; only an unknown id is an error.
    ///
    /// Reconnecting a server that is already `connected` keeps it routable
    /// while the probe runs; only a failed probe takes it out of service.
    pub async fn connect(&self, id: &str) -> Result<bool, HubError> {
        let (adapter, epoch, previous) = {
            let mut servers = self.servers.write();
            let entry = servers.get_mut(id).ok_or_else(|| HubError::server_not_found(id))?;
            entry.epoch += 1;
            entry.active = true;
            let previous = entry.descriptor.status;
            if previous != ServerStatus::Connected {
                entry.descriptor.status = ServerStatus::Connecting;
            }
            (entry.adapter.clone(), entry.epoch, previous)
        };
        if previous != ServerStatus::Connected {
            self.notify_change(id, previous, ServerStatus::Connecting);
        }

        match self.probe(&adapter, id).await {
            Ok(()) => {
                let applied = self.apply(id, epoch, ServerStatus::Connected, true);
                if applied {
                    info!("Server {id} connected");
                }
                Ok(applied)
            }
            Err(e) => {
                warn!("Failed to connect to server {id}: {e}");
                self.apply(id, epoch, ServerStatus::Error, false);
                Ok(false)
            }
        }
    }

    /// Mark the server disconnected and stop monitoring it. Unknown ids are
    /// a no-op.
    pub fn disconnect(&self, id: &str) {
        let previous = {
            let mut servers = self.servers.write();
            let Some(entry) = servers.get_mut(id) else {
                debug!("Disconnect ignored for unknown server: {id}");
                return;
            };
            entry.epoch += 1;
            entry.active = false;
            let previous = entry.descriptor.status;
            entry.descriptor.status = ServerStatus::Disconnected;
            previous
        };
        info!("Server {id} disconnected");
        self.notify_change(id, previous, ServerStatus::Disconnected);
    }

    /// Unregister a server entirely. Returns false if it was unknown.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.servers.write().remove(id).is_some();
        if removed {
            info!("Server {id} removed");
        }
        removed
    }

    /// Probe one active server. Success refreshes the heartbeat and marks it
    /// `connected`; failure marks it `disconnected`.
    ///
    /// Inactive servers and servers mid-connect are left alone. Returns the
    /// status after the heartbeat.
    pub async fn heartbeat(&self, id: &str) -> Result<ServerStatus, HubError> {
        let (adapter, epoch) = {
            let servers = self.servers.read();
            let entry = servers.get(id).ok_or_else(|| HubError::server_not_found(id))?;
            if !entry.active || entry.descriptor.status == ServerStatus::Connecting {
                return Ok(entry.descriptor.status);
            }
            (entry.adapter.clone(), entry.epoch)
        };

        match self.probe(&adapter, id).await {
            Ok(()) => {
                self.apply(id, epoch, ServerStatus::Connected, true);
            }
            Err(e) => {
                warn!("Health check failed for server {id}: {e}");
                self.apply(id, epoch, ServerStatus::Disconnected, false);
            }
        }

        self.get(id)
            .map(|d| d.status)
            .ok_or_else(|| HubError::server_not_found(id))
    }

    /// Heartbeat every active server concurrently.
    pub async fn heartbeat_all(self: &Arc<Self>) -> Vec<(String, ServerStatus)> {
        let ids: Vec<String> = self
            .servers
            .read()
            .iter()
            .filter(|(_, e)| e.active)
            .map(|(id, _)| id.clone())
            .collect();

        let mut tasks = JoinSet::new();
        for id in ids {
            let registry = self.clone();
            tasks.spawn(async move {
                let status = registry.heartbeat(&id).await;
                (id, status)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(status))) => results.push((id, status)),
                // Removed while the probe was in flight.
                Ok((id, Err(e))) => debug!("Heartbeat skipped for {id}: {e}"),
                Err(e) => warn!("Heartbeat task failed: {e}"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    pub fn get(&self, id: &str) -> Option<ServerDescriptor> {
        self.servers.read().get(id).map(|e| e.descriptor.clone())
    }

    /// All servers, ordered by priority then id.
    pub fn list(&self) -> Vec<ServerDescriptor> {
        let mut servers: Vec<ServerDescriptor> =
            self.servers.read().values().map(|e| e.descriptor.clone()).collect();
        servers.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        servers
    }

    pub fn connected(&self) -> Vec<ServerDescriptor> {
        self.list().into_iter().filter(ServerDescriptor::is_connected).collect()
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.connected().into_iter().map(|d| d.id).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }

    /// Resolve a dispatch target. Fails if the server is unknown or not
    /// connected.
    pub(crate) fn route(&self, id: &str) -> Result<(ServerDescriptor, SharedAdapter), HubError> {
        let servers = self.servers.read();
        let entry = servers.get(id).ok_or_else(|| HubError::server_not_found(id))?;
        if !entry.descriptor.is_connected() {
            return Err(HubError::server_not_connected(id));
        }
        Ok((entry.descriptor.clone(), entry.adapter.clone()))
    }

    // ── Internal ──────────────────────────────────────────────────────────

    async fn probe(&self, adapter: &SharedAdapter, id: &str) -> Result<(), ProtocolError> {
        match tokio::time::timeout(self.probe_timeout, adapter.probe_dyn(id)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProtocolError::timeout(format!(
                "probe timed out after {}ms",
                self.probe_timeout.as_millis()
            ))),
        }
    }

    /// Apply a probe outcome if no newer transition happened meanwhile.
    fn apply(&self, id: &str, epoch: u64, status: ServerStatus, touch: bool) -> bool {
        let previous = {
            let mut servers = self.servers.write();
            let Some(entry) = servers.get_mut(id) else {
                return false;
            };
            if entry.epoch != epoch {
                debug!("Discarding stale probe result for {id}");
                return false;
            }
            if touch {
                entry.descriptor.last_heartbeat = Some(Utc::now());
            }
            let previous = entry.descriptor.status;
            entry.descriptor.status = status;
            previous
        };
        self.notify_change(id, previous, status);
        true
    }

    fn notify_change(&self, id: &str, from: ServerStatus, to: ServerStatus) {
        if from != to {
            self.events.emit(HubEvent::ServerStatusChanged {
                server: id.to_string(),
                from,
                to,
            });
        }
    }
}

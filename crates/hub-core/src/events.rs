//! Event notifier: in-process publish/subscribe plus a broadcast fan-out.
//!
//! Listeners run synchronously in registration order. A listener that
//! returns an error or panics is logged and skipped; the rest still run and
//! the publisher never sees the failure. Every published event is also
//! serialized as a [`Notification`] onto a broadcast channel for observers
//! outside the process (no receivers is fine).

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hub_protocol::{EventName, Events, Notification};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::autonomous::TickReport;
use crate::model::{Command, ServerStatus};
use crate::workflow::WorkflowResult;

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Payload of a hub event.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HubEvent {
    CommandExecuted(Command),
    ServerStatusChanged {
        server: String,
        from: ServerStatus,
        to: ServerStatus,
    },
    WorkflowCompleted(WorkflowResult),
    AutonomousTick(TickReport),
}

impl HubEvent {
    /// The channel this event is published on.
    pub fn name(&self) -> EventName {
        match self {
            Self::CommandExecuted(_) => Events::COMMAND_EXECUTED,
            Self::ServerStatusChanged { .. } => Events::SERVER_STATUS_CHANGED,
            Self::WorkflowCompleted(_) => Events::WORKFLOW_COMPLETED,
            Self::AutonomousTick(_) => Events::AUTONOMOUS_TICK,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Self::CommandExecuted(cmd) => Some(cmd),
            _ => None,
        }
    }
}

/// Typed observer for hub events. Closures of the right shape implement it.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &HubEvent) -> ListenerResult;
}

impl<F> Listener for F
where
    F: Fn(&HubEvent) -> ListenerResult + Send + Sync,
{
    fn on_event(&self, event: &HubEvent) -> ListenerResult {
        self(event)
    }
}

/// Handle returned by [`EventNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type ListenerEntry = (SubscriptionId, Arc<dyn Listener>);

pub struct EventNotifier {
    listeners: RwLock<HashMap<String, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
    notification_tx: broadcast::Sender<String>,
}

impl EventNotifier {
    pub fn new() -> Self {
        let (notification_tx, _) = broadcast::channel(1024);
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            notification_tx,
        }
    }

    /// Register a listener for `event_name`.
    pub fn subscribe<L: Listener + 'static>(&self, event_name: &str, listener: L) -> SubscriptionId {
        self.subscribe_shared(event_name, Arc::new(listener))
    }

    pub fn subscribe_shared(&self, event_name: &str, listener: Arc<dyn Listener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(event_name.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns false if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|(sid, _)| *sid == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners.read().get(event_name).map_or(0, Vec::len)
    }

    /// Receiver for serialized notifications of every published event.
    pub fn notifications(&self) -> broadcast::Receiver<String> {
        self.notification_tx.subscribe()
    }

    /// Publish `event` on its own channel.
    pub fn emit(&self, event: HubEvent) {
        self.publish(event.name(), &event);
    }

    /// Invoke every listener registered for `event_name`, in order.
    pub fn publish(&self, event_name: &str, event: &HubEvent) {
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let targets: Vec<ListenerEntry> = self
            .listeners
            .read()
            .get(event_name)
            .cloned()
            .unwrap_or_default();

        for (id, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Event listener {id} failed for {event_name}: {e}"),
                Err(_) => error!("Event listener {id} panicked for {event_name}"),
            }
        }

        self.fan_out(event_name, event);
    }

    fn fan_out(&self, event_name: &str, event: &HubEvent) {
        if self.notification_tx.receiver_count() == 0 {
            return;
        }
        let params = serde_json::to_value(event).unwrap_or_else(|e| json!({ "error": e.to_string() }));
        let notification = Notification::new(event_name, Some(params));
        if let Ok(line) = serde_json::to_string(&notification) {
            let _ = self.notification_tx.send(line);
        }
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

//! Command dispatcher: one request, one backend, one terminal outcome.
//!
//! `execute` never returns an error. Every failure mode (unknown server,
//! disconnected server, invalid method, backend error, timeout) ends up on
//! the returned [`Command`] with status `failed`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hub_protocol::{ErrorCode, Params, Request};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::SharedAdapter;
use crate::error::HubError;
use crate::events::{EventNotifier, HubEvent};
use crate::model::{Command, Initiator, ServerDescriptor};
use crate::registry::ServerRegistry;

pub struct Dispatcher {
    registry: Arc<ServerRegistry>,
    events: Arc<EventNotifier>,
    /// Commands that have not reached a terminal state yet.
    active: DashMap<String, Command>,
    /// Terminal commands, oldest first.
    history: Mutex<VecDeque<Command>>,
    history_limit: usize,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ServerRegistry>,
        events: Arc<EventNotifier>,
        timeout: Duration,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            events,
            active: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            history_limit,
            timeout,
        }
    }

    /// Dispatch `method` to `server` and wait for its terminal outcome.
    ///
    /// `params` must be a JSON object (or null for no parameters).
    pub async fn execute(&self, server: &str, method: &str, params: Value, initiator: Initiator) -> Command {
        let (params, malformed) = match params {
            Value::Object(map) => (map, None),
            Value::Null => (Params::new(), None),
            other => (
                Params::new(),
                Some(HubError::validation(format!("params must be a JSON object, got {other}"))),
            ),
        };

        let mut command = Command::pending(server, method, params, initiator);
        self.track(&command);
        let _in_flight = InFlight {
            dispatcher: self,
            id: command.id.clone(),
            since: Instant::now(),
        };
        debug!("Command {} pending: {server}.{method} ({:?})", command.id, initiator);

        let adapter = match self.resolve(server, method, malformed) {
            Ok(adapter) => adapter,
            Err(e) => {
                command.fail(e, 0);
                return self.finish(command);
            }
        };

        command.begin();
        self.track(&command);

        let started = Instant::now();
        let request = Request::new(command.id.clone(), method, command.params.clone());
        let outcome = tokio::time::timeout(self.timeout, adapter.send_dyn(server, request)).await;
        let elapsed_ms = millis(started.elapsed());

        match outcome {
            Ok(response) if response.id != command.id => {
                let error = HubError::Backend {
                    code: ErrorCode::InternalError.code(),
                    message: format!("response id mismatch: expected {}, got {}", command.id, response.id),
                    data: None,
                };
                command.fail(error, elapsed_ms);
            }
            Ok(response) => match response.into_outcome() {
                Ok(result) => command.complete(result, elapsed_ms),
                Err(e) => command.fail(e.into(), elapsed_ms),
            },
            Err(_) => command.fail(HubError::timeout(self.timeout), elapsed_ms),
        }

        self.finish(command)
    }

    /// Commands that are still pending or executing.
    pub fn active_commands(&self) -> Vec<Command> {
        let mut commands: Vec<Command> = self.active.iter().map(|c| c.value().clone()).collect();
        commands.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        commands
    }

    /// Recently finished commands, oldest first.
    pub fn recent_commands(&self) -> Vec<Command> {
        self.history.lock().iter().cloned().collect()
    }

    /// Look up a command by id, in flight or recently finished.
    pub fn get(&self, id: &str) -> Option<Command> {
        if let Some(cmd) = self.active.get(id) {
            return Some(cmd.value().clone());
        }
        self.history.lock().iter().rev().find(|c| c.id == id).cloned()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ── Internal ──────────────────────────────────────────────────────────

    fn resolve(&self, server: &str, method: &str, malformed: Option<HubError>) -> Result<SharedAdapter, HubError> {
        let (descriptor, adapter) = self.registry.route(server)?;
        if let Some(e) = malformed {
            return Err(e);
        }
        validate(&descriptor, method)?;
        Ok(adapter)
    }

    fn track(&self, command: &Command) {
        self.active.insert(command.id.clone(), command.clone());
    }

    fn finish(&self, command: Command) -> Command {
        self.active.remove(&command.id);
        self.record(command)
    }

    /// Move a terminal command into history and announce it.
    fn record(&self, command: Command) -> Command {
        {
            let mut history = self.history.lock();
            history.push_back(command.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }

        match &command.error {
            None => info!(
                "Command {} completed: {}.{} in {}ms",
                command.id,
                command.server,
                command.method,
                command.execution_time_ms.unwrap_or(0)
            ),
            Some(e) => warn!(
                "Command {} failed: {}.{}: {e}",
                command.id, command.server, command.method
            ),
        }

        self.events.emit(HubEvent::CommandExecuted(command.clone()));
        command
    }
}

/// Fails the command if `execute` is dropped before it finishes, so a
/// cancelled caller never leaves it behind in the active table.
struct InFlight<'a> {
    dispatcher: &'a Dispatcher,
    id: String,
    since: Instant,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Already finished normally.
        let Some((_, mut command)) = self.dispatcher.active.remove(&self.id) else {
            return;
        };
        command.fail(HubError::Cancelled, millis(self.since.elapsed()));
        self.dispatcher.record(command);
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn validate(descriptor: &ServerDescriptor, method: &str) -> Result<(), HubError> {
    if method.trim().is_empty() {
        return Err(HubError::validation("method name is empty"));
    }
    if !descriptor.supports(method) {
        return Err(HubError::validation(format!(
            "{} does not support method {method}",
            descriptor.id
        )));
    }
    Ok(())
}

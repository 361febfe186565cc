//! Autonomous loop: periodic context → decision → dispatch.
//!
//! Each tick fetches a business snapshot, asks the decision provider for at
//! most one action against the currently connected servers and dispatches
//! it. A failing or panicking tick is logged and counted; the next tick runs
//! on schedule regardless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::HubError;
use crate::events::{EventNotifier, HubEvent};
use crate::model::{Action, Command, CommandStatus, Initiator};
use crate::providers::{SharedContextProvider, SharedDecisionProvider};
use crate::registry::ServerRegistry;

/// What happened on one tick, published as `autonomous/tick`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_status: Option<CommandStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TickReport {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            at: Utc::now(),
            action: None,
            command_id: None,
            command_status: None,
            error: None,
        }
    }

    fn record(&mut self, command: &Command) {
        self.command_id = Some(command.id.clone());
        self.command_status = Some(command.status);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStats {
    pub ticks: u64,
    pub actions_dispatched: u64,
    pub failed_ticks: u64,
}

/// Shared by the loop task and the hub's one-shot AI commands.
pub(crate) struct Decider {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) registry: Arc<ServerRegistry>,
    pub(crate) decision: SharedDecisionProvider,
    pub(crate) decision_timeout: Duration,
}

impl Decider {
    /// Ask for one action against the connected servers and dispatch it.
    pub(crate) async fn decide_and_dispatch(
        &self,
        context: &str,
        initiator: Initiator,
    ) -> Result<Option<(Action, Command)>, HubError> {
        let available = self.registry.connected_ids();
        let decision = tokio::time::timeout(self.decision_timeout, self.decision.decide_dyn(context, &available))
            .await
            .map_err(|_| HubError::timeout(self.decision_timeout))??;

        let Some(action) = decision else {
            debug!("Decision provider suggested no action");
            return Ok(None);
        };

        info!("Dispatching suggested action: {}.{}", action.server, action.method);
        let command = self
            .dispatcher
            .execute(
                &action.server,
                &action.method,
                Value::Object(action.params.clone()),
                initiator,
            )
            .await;
        Ok(Some((action, command)))
    }
}

struct LoopInner {
    decider: Arc<Decider>,
    context: SharedContextProvider,
    events: Arc<EventNotifier>,
    stats: Mutex<LoopStats>,
}

impl LoopInner {
    async fn run_tick(&self, report: &mut TickReport) -> Result<(), HubError> {
        let snapshot = tokio::time::timeout(self.decider.decision_timeout, self.context.snapshot_dyn())
            .await
            .map_err(|_| HubError::timeout(self.decider.decision_timeout))??;

        let Some((action, command)) = self
            .decider
            .decide_and_dispatch(&snapshot.summary(), Initiator::Automation)
            .await?
        else {
            return Ok(());
        };

        self.stats.lock().actions_dispatched += 1;
        report.action = Some(action);
        report.record(&command);
        match command.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail_tick(&self, tick: u64, report: &mut TickReport, message: String) {
        warn!("Autonomous tick {tick} failed: {message}");
        self.stats.lock().failed_ticks += 1;
        report.error = Some(message);
    }
}

struct LoopHandle {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct AutonomousLoop {
    inner: Arc<LoopInner>,
    running: Mutex<Option<LoopHandle>>,
}

impl AutonomousLoop {
    pub(crate) fn new(decider: Arc<Decider>, context: SharedContextProvider, events: Arc<EventNotifier>) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                decider,
                context,
                events,
                stats: Mutex::new(LoopStats::default()),
            }),
            running: Mutex::new(None),
        }
    }

    /// Start ticking every `interval`, first tick immediately.
    ///
    /// Returns `Ok(false)` if the loop was already running; a second start
    /// never creates a second schedule.
    pub fn start(&self, interval: Duration) -> Result<bool, HubError> {
        if interval.is_zero() {
            return Err(HubError::validation("autonomous interval must be non-zero"));
        }

        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|h| !h.handle.is_finished()) {
            debug!("Autonomous loop already running");
            return Ok(false);
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => tick(&inner).await,
                }
            }
            debug!("Autonomous loop exited");
        });

        info!("Autonomous loop started (every {}ms)", interval.as_millis());
        *running = Some(LoopHandle { shutdown_tx, handle });
        Ok(true)
    }

    /// Stop the loop and wait for it to exit. An in-flight tick finishes
    /// first. Returns false if the loop was not running.
    pub async fn stop(&self) -> bool {
        let Some(LoopHandle { shutdown_tx, handle }) = self.running.lock().take() else {
            return false;
        };
        let _ = shutdown_tx.send(()).await;
        if let Err(e) = handle.await {
            error!("Autonomous loop task failed: {e}");
        }
        info!("Autonomous loop stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|h| !h.handle.is_finished())
    }

    pub fn stats(&self) -> LoopStats {
        *self.inner.stats.lock()
    }
}

impl Drop for AutonomousLoop {
    fn drop(&mut self) {
        if let Some(h) = self.running.get_mut().take() {
            h.handle.abort();
        }
    }
}

async fn tick(inner: &Arc<LoopInner>) {
    let tick = {
        let mut stats = inner.stats.lock();
        stats.ticks += 1;
        stats.ticks
    };
    debug!("Autonomous tick {tick}");

    // Run on its own task so a panicking provider can't take the loop down.
    let worker = inner.clone();
    let outcome = tokio::spawn(async move {
        let mut report = TickReport::new(tick);
        let result = worker.run_tick(&mut report).await;
        (report, result)
    })
    .await;

    let report = match outcome {
        Ok((report, Ok(()))) => report,
        Ok((mut report, Err(e))) => {
            inner.fail_tick(tick, &mut report, e.to_string());
            report
        }
        Err(e) => {
            let mut report = TickReport::new(tick);
            inner.fail_tick(tick, &mut report, format!("tick task failed: {e}"));
            report
        }
    };

    inner.events.emit(HubEvent::AutonomousTick(report));
}

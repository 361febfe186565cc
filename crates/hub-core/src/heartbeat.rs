//! Periodic liveness probing of every active server.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::ServerRegistry;

pub struct HeartbeatMonitor {
    registry: Arc<ServerRegistry>,
    running: Mutex<Option<(mpsc::Sender<()>, JoinHandle<()>)>>,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self {
            registry,
            running: Mutex::new(None),
        }
    }

    /// Probe active servers every `interval`, starting one interval from
    /// now. Returns false if already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|(_, h)| !h.is_finished()) || interval.is_zero() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let registry = self.registry.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let results = registry.heartbeat_all().await;
                        debug!("Heartbeat round complete: {} servers probed", results.len());
                    }
                }
            }
        });

        info!("Heartbeat monitor started (every {}ms)", interval.as_millis());
        *running = Some((shutdown_tx, handle));
        true
    }

    pub async fn stop(&self) -> bool {
        let Some((shutdown_tx, handle)) = self.running.lock().take() else {
            return false;
        };
        let _ = shutdown_tx.send(()).await;
        let _ = handle.await;
        info!("Heartbeat monitor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|(_, h)| !h.is_finished())
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.running.get_mut().take() {
            handle.abort();
        }
    }
}

//! CommandHub, the facade tying the components together.
//!
//! Build one per process with [`CommandHub::builder`] and share it behind an
//! `Arc`. There is no global instance.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adapter::SharedAdapter;
use crate::autonomous::{AutonomousLoop, Decider, LoopStats};
use crate::config::HubConfig;
use crate::dispatcher::Dispatcher;
use crate::error::HubError;
use crate::events::{EventNotifier, Listener, SubscriptionId};
use crate::heartbeat::HeartbeatMonitor;
use crate::model::{Command, Initiator, ServerDescriptor};
use crate::playbooks;
use crate::providers::{SharedAnalyzer, SharedContextProvider, SharedDecisionProvider};
use crate::registry::ServerRegistry;
use crate::workflow::{Orchestrator, Workflow, WorkflowResult};

pub struct CommandHubBuilder {
    config: HubConfig,
    context: Option<SharedContextProvider>,
    decision: Option<SharedDecisionProvider>,
    analyzer: Option<SharedAnalyzer>,
}

impl CommandHubBuilder {
    pub fn context_provider(mut self, provider: SharedContextProvider) -> Self {
        self.context = Some(provider);
        self
    }

    pub fn decision_provider(mut self, provider: SharedDecisionProvider) -> Self {
        self.decision = Some(provider);
        self
    }

    pub fn analyzer(mut self, analyzer: SharedAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn build(self) -> CommandHub {
        let config = self.config;
        let events = Arc::new(EventNotifier::new());
        let registry = Arc::new(ServerRegistry::new(events.clone(), config.command_timeout()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            events.clone(),
            config.command_timeout(),
            config.history_limit,
        ));

        let orchestrator = Orchestrator::new(dispatcher.clone(), events.clone());
        orchestrator.register(playbooks::schedule_job_with_notifications());
        if let Some(analyzer) = self.analyzer {
            orchestrator.register(playbooks::create_job_from_email(analyzer));
        }

        let decider = self.decision.map(|decision| {
            Arc::new(Decider {
                dispatcher: dispatcher.clone(),
                registry: registry.clone(),
                decision,
                decision_timeout: config.decision_timeout(),
            })
        });
        let autonomous = match (&decider, self.context) {
            (Some(decider), Some(context)) => Some(AutonomousLoop::new(decider.clone(), context, events.clone())),
            _ => None,
        };

        let heartbeat = HeartbeatMonitor::new(registry.clone());

        CommandHub {
            config,
            events,
            registry,
            dispatcher,
            orchestrator,
            decider,
            autonomous,
            heartbeat,
        }
    }
}

pub struct CommandHub {
    config: HubConfig,
    events: Arc<EventNotifier>,
    registry: Arc<ServerRegistry>,
    dispatcher: Arc<Dispatcher>,
    orchestrator: Orchestrator,
    decider: Option<Arc<Decider>>,
    autonomous: Option<AutonomousLoop>,
    heartbeat: HeartbeatMonitor,
}

impl CommandHub {
    pub fn builder(config: HubConfig) -> CommandHubBuilder {
        CommandHubBuilder {
            config,
            context: None,
            decision: None,
            analyzer: None,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn events(&self) -> &Arc<EventNotifier> {
        &self.events
    }

    // ── Servers ─────────────────────────────────────────────────────────

    pub fn register_server(&self, descriptor: ServerDescriptor, adapter: SharedAdapter) -> Result<(), HubError> {
        self.registry.register(descriptor, adapter)
    }

    /// Register every configured server, all served by `adapter`.
    pub fn register_configured(&self, adapter: SharedAdapter) -> Result<usize, HubError> {
        for server in &self.config.servers {
            self.registry.register(server.descriptor(), adapter.clone())?;
        }
        Ok(self.config.servers.len())
    }

    pub async fn connect_server(&self, id: &str) -> Result<bool, HubError> {
        self.registry.connect(id).await
    }

    pub fn disconnect_server(&self, id: &str) {
        self.registry.disconnect(id);
    }

    /// Connect every enabled configured server. Returns the ids that came up.
    pub async fn connect_enabled(&self) -> Vec<String> {
        let mut connected = Vec::new();
        for server in self.config.servers.iter().filter(|s| s.enabled) {
            match self.registry.connect(&server.id).await {
                Ok(true) => connected.push(server.id.clone()),
                Ok(false) => {}
                Err(e) => warn!("Cannot connect {}: {e}", server.id),
            }
        }
        info!("Connected {}/{} servers", connected.len(), self.registry.len());
        connected
    }

    pub fn list_servers(&self) -> Vec<ServerDescriptor> {
        self.registry.list()
    }

    pub fn connected_servers(&self) -> Vec<ServerDescriptor> {
        self.registry.connected()
    }

    // ── Commands ────────────────────────────────────────────────────────

    pub async fn execute_command(&self, server: &str, method: &str, params: Value, initiator: Initiator) -> Command {
        self.dispatcher.execute(server, method, params, initiator).await
    }

    pub fn list_active_commands(&self) -> Vec<Command> {
        self.dispatcher.active_commands()
    }

    pub fn recent_commands(&self) -> Vec<Command> {
        self.dispatcher.recent_commands()
    }

    pub fn get_command(&self, id: &str) -> Option<Command> {
        self.dispatcher.get(id)
    }

    /// Ask the decision provider once about `context` and dispatch its
    /// suggestion, if any, with initiator `ai`.
    pub async fn execute_ai_command(&self, context: &str) -> Result<Vec<Command>, HubError> {
        let decider = self
            .decider
            .as_ref()
            .ok_or_else(|| HubError::provider("no decision provider configured"))?;
        let outcome = decider.decide_and_dispatch(context, Initiator::Ai).await?;
        Ok(outcome.into_iter().map(|(_, command)| command).collect())
    }

    // ── Workflows ───────────────────────────────────────────────────────

    pub async fn run_workflow(&self, name: &str, input: Value) -> Result<WorkflowResult, HubError> {
        self.orchestrator.run(name, input).await
    }

    pub fn register_workflow(&self, workflow: Workflow) {
        self.orchestrator.register(workflow);
    }

    pub fn workflow_names(&self) -> Vec<String> {
        self.orchestrator.names()
    }

    // ── Loops ───────────────────────────────────────────────────────────

    /// Start the autonomous loop at the configured interval.
    pub fn start_autonomous_loop(&self) -> Result<bool, HubError> {
        self.autonomous_loop()?.start(self.config.autonomous_interval())
    }

    pub fn start_autonomous_loop_every(&self, interval: std::time::Duration) -> Result<bool, HubError> {
        self.autonomous_loop()?.start(interval)
    }

    pub async fn stop_autonomous_loop(&self) -> bool {
        match &self.autonomous {
            Some(l) => l.stop().await,
            None => false,
        }
    }

    pub fn autonomous_running(&self) -> bool {
        self.autonomous.as_ref().is_some_and(AutonomousLoop::is_running)
    }

    pub fn autonomous_stats(&self) -> LoopStats {
        self.autonomous.as_ref().map(AutonomousLoop::stats).unwrap_or_default()
    }

    /// Start the heartbeat monitor unless heartbeats are disabled.
    pub fn start_heartbeat(&self) -> bool {
        if !self.config.enable_heartbeat {
            return false;
        }
        self.heartbeat.start(self.config.health_check_interval())
    }

    pub async fn stop_heartbeat(&self) -> bool {
        self.heartbeat.stop().await
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    /// Stop both background loops.
    pub async fn shutdown(&self) {
        self.stop_autonomous_loop().await;
        self.stop_heartbeat().await;
        info!("Command hub shut down");
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub fn subscribe<L: Listener + 'static>(&self, event_name: &str, listener: L) -> SubscriptionId {
        self.events.subscribe(event_name, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn notifications(&self) -> broadcast::Receiver<String> {
        self.events.notifications()
    }

    fn autonomous_loop(&self) -> Result<&AutonomousLoop, HubError> {
        self.autonomous
            .as_ref()
            .ok_or_else(|| HubError::provider("autonomous loop needs a context and a decision provider"))
    }
}

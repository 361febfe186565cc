//! Command Hub core.
//!
//! Routes named commands to registered backend integrations, tracks their
//! connectivity, runs multi-step workflows, publishes lifecycle events and
//! drives an optional decision-making loop.

pub mod adapter;
pub mod autonomous;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod hub;
pub mod model;
pub mod playbooks;
pub mod providers;
pub mod registry;
pub mod workflow;

pub use adapter::{BackendAdapter, BackendAdapterDyn, BoxFuture, SharedAdapter};
pub use autonomous::{AutonomousLoop, LoopStats, TickReport};
pub use config::{ConfigError, HubConfig, ServerConfig, default_servers};
pub use dispatcher::Dispatcher;
pub use error::HubError;
pub use events::{EventNotifier, HubEvent, Listener, ListenerResult, SubscriptionId};
pub use heartbeat::HeartbeatMonitor;
pub use hub::{CommandHub, CommandHubBuilder};
pub use model::{Action, Command, CommandStatus, Initiator, ServerDescriptor, ServerStatus};
pub use providers::{
    Analysis, BusinessSnapshot, Communication, CommunicationAnalyzer, ContextProvider, DecisionProvider,
    ReplyChannel, Sentiment, SharedAnalyzer, SharedContextProvider, SharedDecisionProvider, Tone, Urgency,
};
pub use registry::ServerRegistry;
pub use workflow::{Orchestrator, Step, StepOutcome, Workflow, WorkflowContext, WorkflowResult};

//! Shared fixtures: a scripted backend, scripted collaborators and an event
//! recorder.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use hub_core::{
    Action, Analysis, BackendAdapter, BusinessSnapshot, Communication, CommunicationAnalyzer, ContextProvider,
    DecisionProvider, Dispatcher, EventNotifier, HubError, HubEvent, ListenerResult, Orchestrator, ReplyChannel,
    ServerDescriptor, ServerRegistry, Tone,
};
use hub_protocol::{Methods, ProtocolError, Request, Response};
use parking_lot::Mutex;
use serde_json::{Value, json};

// ─────────────────────────────────────────────────────────────────────────────
// Scripted backend
// ─────────────────────────────────────────────────────────────────────────────

/// Backend that answers `health` from a flag and echoes every other request.
#[derive(Default)]
pub struct ScriptedAdapter {
    unhealthy: AtomicBool,
    wrong_id: AtomicBool,
    delay: Mutex<Option<Duration>>,
    probe_delay: Mutex<Option<Duration>>,
    failures: Mutex<HashMap<String, ProtocolError>>,
    calls: Mutex<Vec<(String, Request)>>,
    probes: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock() = Some(delay);
    }

    pub fn answer_with_wrong_id(&self) {
        self.wrong_id.store(true, Ordering::SeqCst);
    }

    pub fn fail_method(&self, method: &str, error: ProtocolError) {
        self.failures.lock().insert(method.to_string(), error);
    }

    /// Non-health requests, in arrival order.
    pub fn calls(&self) -> Vec<(String, Request)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl BackendAdapter for ScriptedAdapter {
    async fn send(&self, server_id: &str, request: Request) -> Response {
        if request.method == Methods::HEALTH {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let delay = *self.probe_delay.lock();
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            let status = if self.unhealthy.load(Ordering::SeqCst) { "down" } else { "ok" };
            return Response::success(request.id, json!({ "status": status }));
        }

        self.calls.lock().push((server_id.to_string(), request.clone()));
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let id = if self.wrong_id.load(Ordering::SeqCst) {
            "someone-else".to_string()
        } else {
            request.id.clone()
        };

        let failure = self.failures.lock().get(&request.method).cloned();
        match failure {
            Some(err) => Response::failure(id, err),
            None => Response::success(
                id,
                json!({
                    "ok": true,
                    "server": server_id,
                    "method": request.method,
                    "echo": Value::Object(request.params),
                }),
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component fixture
// ─────────────────────────────────────────────────────────────────────────────

pub struct Fixture {
    pub events: Arc<EventNotifier>,
    pub registry: Arc<ServerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub adapter: Arc<ScriptedAdapter>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_limits(Duration::from_secs(30), 256)
    }

    pub fn with_limits(timeout: Duration, history_limit: usize) -> Self {
        let events = Arc::new(EventNotifier::new());
        let registry = Arc::new(ServerRegistry::new(events.clone(), timeout));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), events.clone(), timeout, history_limit));
        Self {
            events,
            registry,
            dispatcher,
            adapter: ScriptedAdapter::new(),
        }
    }

    pub fn register(&self, id: &str, capabilities: &[&str]) {
        let descriptor = ServerDescriptor::new(id, id).with_capabilities(capabilities.iter().copied());
        self.registry.register(descriptor, self.adapter.clone()).unwrap();
    }

    pub async fn connect(&self, id: &str, capabilities: &[&str]) {
        self.register(id, capabilities);
        assert!(self.registry.connect(id).await.unwrap(), "{id} should connect");
    }

    /// The well-known integrations, all connected.
    pub async fn connect_business_servers(&self) {
        self.connect("slack", &[Methods::SLACK_SEND_MESSAGE, Methods::SLACK_GET_CHANNELS]).await;
        self.connect("jobber", &[Methods::JOBBER_CREATE_JOB, Methods::JOBBER_GET_JOBS]).await;
        self.connect("gmail", &[Methods::GMAIL_SEND_EMAIL]).await;
        self.connect("twilio", &[Methods::TWILIO_SEND_SMS]).await;
        self.connect("google-calendar", &[Methods::CALENDAR_CREATE_EVENT]).await;
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.dispatcher.clone(), self.events.clone())
    }
}

/// Collect every event published on `event_name`.
pub fn record(events: &EventNotifier, event_name: &str) -> Arc<Mutex<Vec<HubEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    events.subscribe(event_name, move |event: &HubEvent| -> ListenerResult {
        sink.lock().push(event.clone());
        Ok(())
    });
    log
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted collaborators
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedContext {
    failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl ScriptedContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ContextProvider for ScriptedContext {
    async fn snapshot(&self) -> Result<BusinessSnapshot, HubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::provider("crm unavailable"));
        }
        Ok(BusinessSnapshot {
            customers: vec![json!({ "id": "c1" })],
            jobs: vec![json!({ "title": "Roof repair", "status": "in_progress" })],
            communications: vec![json!({ "type": "email", "content": "Leak again", "status": "unread" })],
            metrics: json!({ "revenue": { "thisMonth": 1200 } }),
        })
    }
}

/// Decision provider that replays a script, then repeats `fallback`.
pub struct ScriptedDecision {
    script: Mutex<VecDeque<Result<Option<Action>, HubError>>>,
    fallback: Option<Action>,
    delay: Mutex<Option<Duration>>,
    panic_next: AtomicBool,
    seen: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedDecision {
    pub fn repeating(action: Option<Action>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: action,
            delay: Mutex::new(None),
            panic_next: AtomicBool::new(false),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, outcome: Result<Option<Action>, HubError>) {
        self.script.lock().push_back(outcome);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn panic_once(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// `(context, available servers)` for every call.
    pub fn seen(&self) -> Vec<(String, Vec<String>)> {
        self.seen.lock().clone()
    }
}

impl DecisionProvider for ScriptedDecision {
    async fn decide(&self, context: &str, available_servers: &[String]) -> Result<Option<Action>, HubError> {
        self.seen.lock().push((context.to_string(), available_servers.to_vec()));
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("decision model exploded");
        }
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Analyzer returning a fixed analysis (or failing when `None`).
pub struct ScriptedAnalyzer {
    analysis: Option<Analysis>,
    reply: Option<String>,
    pub tones: Mutex<Vec<Tone>>,
}

impl ScriptedAnalyzer {
    pub fn new(analysis: Option<Analysis>, reply: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            analysis,
            reply: reply.map(str::to_string),
            tones: Mutex::new(Vec::new()),
        })
    }
}

impl CommunicationAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _communication: &Communication) -> Result<Analysis, HubError> {
        self.analysis.clone().ok_or_else(|| HubError::provider("model offline"))
    }

    async fn draft_reply(&self, _context: &str, _channel: ReplyChannel, tone: Tone) -> Result<String, HubError> {
        self.tones.lock().push(tone);
        self.reply.clone().ok_or_else(|| HubError::provider("model offline"))
    }
}

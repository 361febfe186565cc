//! Workflow orchestrator: named multi-step automations over the dispatcher.
//!
//! A workflow is an ordered list of dispatch steps with best-effort
//! continuation: a failed step is recorded and the remaining steps still run.
//! Earlier successes are never compensated. Every step shows up in the
//! result as completed, failed or skipped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hub_protocol::Params;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::BoxFuture;
use crate::dispatcher::Dispatcher;
use crate::error::HubError;
use crate::events::{EventNotifier, HubEvent};
use crate::model::{Command, Initiator};

pub type ParamsFn = Arc<dyn Fn(&WorkflowContext) -> Result<Value, HubError> + Send + Sync>;
pub type ConditionFn = Arc<dyn Fn(&WorkflowContext) -> bool + Send + Sync>;
pub type PrepareFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Params, HubError>> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Definition
// ─────────────────────────────────────────────────────────────────────────────

/// State visible to step conditions and parameter builders.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub input: Value,
    /// Variables produced by the workflow's prepare stage.
    pub vars: Params,
    /// Outcomes of the steps that already ran, in order.
    pub outcomes: Vec<StepOutcome>,
}

impl WorkflowContext {
    pub fn var(&self, key: &str) -> &Value {
        self.vars.get(key).unwrap_or(&Value::Null)
    }

    /// Required string field from the workflow input.
    pub fn input_str(&self, key: &str) -> Result<&str, HubError> {
        self.input[key]
            .as_str()
            .ok_or_else(|| HubError::validation(format!("workflow input is missing `{key}`")))
    }

    pub fn outcome(&self, purpose: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.purpose() == purpose)
    }

    pub fn completed(&self, purpose: &str) -> bool {
        self.outcome(purpose).is_some_and(StepOutcome::is_completed)
    }
}

/// One dispatch in a workflow.
#[derive(Clone)]
pub struct Step {
    purpose: String,
    server: String,
    method: String,
    params: ParamsFn,
    condition: Option<(String, ConditionFn)>,
}

impl Step {
    pub fn new(purpose: impl Into<String>, server: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            server: server.into(),
            method: method.into(),
            params: Arc::new(|_| Ok(Value::Object(Params::new()))),
            condition: None,
        }
    }

    /// Build the step's params from the workflow context.
    pub fn params<F>(mut self, f: F) -> Self
    where
        F: Fn(&WorkflowContext) -> Result<Value, HubError> + Send + Sync + 'static,
    {
        self.params = Arc::new(f);
        self
    }

    /// Only run the step when `f` holds; otherwise record it as skipped
    /// with `skip_reason`.
    pub fn when<F>(mut self, skip_reason: impl Into<String>, f: F) -> Self
    where
        F: Fn(&WorkflowContext) -> bool + Send + Sync + 'static,
    {
        self.condition = Some((skip_reason.into(), Arc::new(f)));
        self
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("purpose", &self.purpose)
            .field("server", &self.server)
            .field("method", &self.method)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// A named, ordered sequence of steps.
#[derive(Clone)]
pub struct Workflow {
    name: String,
    description: String,
    prepare: Option<PrepareFn>,
    steps: Vec<Step>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            prepare: None,
            steps: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Async stage run before the first step. Its variables are visible to
    /// every step through [`WorkflowContext::var`].
    pub fn prepare<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Params, HubError>> + Send + 'static,
    {
        self.prepare = Some(Arc::new(move |input| Box::pin(f(input))));
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepOutcome {
    Completed {
        purpose: String,
        command: Command,
    },
    Failed {
        purpose: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<Command>,
        error: HubError,
    },
    Skipped {
        purpose: String,
        reason: String,
    },
}

impl StepOutcome {
    pub fn purpose(&self) -> &str {
        match self {
            Self::Completed { purpose, .. } | Self::Failed { purpose, .. } | Self::Skipped { purpose, .. } => purpose,
        }
    }

    pub fn command(&self) -> Option<&Command> {
        match self {
            Self::Completed { command, .. } => Some(command),
            Self::Failed { command, .. } => command.as_ref(),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
}

impl WorkflowResult {
    /// Every command that was dispatched, in step order.
    pub fn commands(&self) -> Vec<&Command> {
        self.steps.iter().filter_map(StepOutcome::command).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_completed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_skipped()).count()
    }

    /// Some steps succeeded and some failed.
    pub fn is_partial(&self) -> bool {
        self.completed_count() > 0 && self.failed_count() > 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
    events: Arc<EventNotifier>,
    workflows: RwLock<HashMap<String, Arc<Workflow>>>,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>, events: Arc<EventNotifier>) -> Self {
        Self {
            dispatcher,
            events,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// Register a workflow under its name, replacing any previous one.
    pub fn register(&self, workflow: Workflow) {
        let name = workflow.name.clone();
        if self.workflows.write().insert(name.clone(), Arc::new(workflow)).is_some() {
            warn!("Workflow {name} replaced");
        } else {
            debug!("Workflow registered: {name}");
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.read().get(name).cloned()
    }

    /// Run a registered workflow by name.
    pub async fn run(&self, name: &str, input: Value) -> Result<WorkflowResult, HubError> {
        let workflow = self
            .get(name)
            .ok_or_else(|| HubError::UnknownWorkflow { name: name.to_string() })?;
        self.run_workflow(&workflow, input).await
    }

    /// Run `workflow` step by step. Step failures are recorded, never
    /// returned; only a failing prepare stage is an `Err`.
    pub async fn run_workflow(&self, workflow: &Workflow, input: Value) -> Result<WorkflowResult, HubError> {
        let started_at = Utc::now();
        info!("Workflow {} started ({} steps)", workflow.name, workflow.steps.len());

        let vars = match &workflow.prepare {
            Some(prepare) => prepare(input.clone()).await.map_err(|e| HubError::Workflow {
                name: workflow.name.clone(),
                message: e.to_string(),
            })?,
            None => Params::new(),
        };

        let mut ctx = WorkflowContext {
            input,
            vars,
            outcomes: Vec::with_capacity(workflow.steps.len()),
        };

        for step in &workflow.steps {
            let outcome = self.run_step(step, &ctx).await;
            ctx.outcomes.push(outcome);
        }

        let result = WorkflowResult {
            workflow: workflow.name.clone(),
            started_at,
            finished_at: Utc::now(),
            steps: ctx.outcomes,
        };

        info!(
            "Workflow {} finished: {} completed, {} failed, {} skipped",
            result.workflow,
            result.completed_count(),
            result.failed_count(),
            result.skipped_count()
        );
        self.events.emit(HubEvent::WorkflowCompleted(result.clone()));
        Ok(result)
    }

    async fn run_step(&self, step: &Step, ctx: &WorkflowContext) -> StepOutcome {
        let purpose = step.purpose.clone();

        if let Some((reason, condition)) = &step.condition {
            if !condition(ctx) {
                debug!("Step skipped: {purpose} ({reason})");
                return StepOutcome::Skipped {
                    purpose,
                    reason: reason.clone(),
                };
            }
        }

        let params = match (step.params)(ctx) {
            Ok(params) => params,
            Err(error) => {
                warn!("Step {purpose} could not build params: {error}");
                return StepOutcome::Failed {
                    purpose,
                    command: None,
                    error,
                };
            }
        };

        let command = self
            .dispatcher
            .execute(&step.server, &step.method, params, Initiator::Automation)
            .await;

        match command.error.clone() {
            None => StepOutcome::Completed { purpose, command },
            Some(error) => StepOutcome::Failed {
                purpose,
                command: Some(command),
                error,
            },
        }
    }
}

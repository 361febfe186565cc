//! External collaborators consumed by the autonomous loop and workflows.
//!
//! The context source, the decision maker (usually a language model) and the
//! communication analyzer are all out-of-process concerns. The hub only sees
//! these traits, so scheduling and error containment can be exercised with
//! scripted implementations.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::BoxFuture;
use crate::error::HubError;
use crate::model::Action;

// ─────────────────────────────────────────────────────────────────────────────
// Data
// ─────────────────────────────────────────────────────────────────────────────

/// Current business state handed to the decision provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessSnapshot {
    pub customers: Vec<Value>,
    pub jobs: Vec<Value>,
    pub communications: Vec<Value>,
    pub metrics: Value,
}

impl BusinessSnapshot {
    /// Render the textual status summary used as decision context.
    pub fn summary(&self) -> String {
        let active_jobs = self
            .jobs
            .iter()
            .filter(|j| j["status"] == "in_progress")
            .count();
        let pending_comms = self
            .communications
            .iter()
            .filter(|c| c["status"] != "read")
            .count();
        let revenue = self.metrics["revenue"]["thisMonth"]
            .as_f64()
            .unwrap_or(0.0);

        let mut out = format!(
            "Business Status Summary:\n\
             - Total Customers: {}\n\
             - Active Jobs: {active_jobs}\n\
             - Pending Communications: {pending_comms}\n\
             - Revenue this month: {revenue}\n\nRecent activity:",
            self.customers.len(),
        );
        for c in self.communications.iter().take(3) {
            let kind = c["type"].as_str().unwrap_or("message");
            let content = truncate(c["content"].as_str().unwrap_or(""), 50);
            out.push_str(&format!("\n- {kind}: {content}"));
        }
        for j in self.jobs.iter().take(3) {
            let title = j["title"].as_str().unwrap_or("untitled");
            let status = j["status"].as_str().unwrap_or("unknown");
            out.push_str(&format!("\n- Job: {title} ({status})"));
        }
        out
    }
}

/// An inbound customer communication to be analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub from_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl Analysis {
    /// Neutral, medium-urgency analysis used when the analyzer is unavailable.
    pub fn fallback(content: &str) -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            urgency: Urgency::Medium,
            suggested_actions: vec!["Review communication".into()],
            summary: truncate(content, 100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyChannel {
    Email,
    Sms,
    Slack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Urgent,
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Supplies the current business-state snapshot.
pub trait ContextProvider: Send + Sync {
    fn snapshot(&self) -> impl Future<Output = Result<BusinessSnapshot, HubError>> + Send;
}

/// Suggests zero or one action for a context. Usually wraps an LLM call.
pub trait DecisionProvider: Send + Sync {
    fn decide(
        &self,
        context: &str,
        available_servers: &[String],
    ) -> impl Future<Output = Result<Option<Action>, HubError>> + Send;
}

/// Classifies inbound communications and drafts replies for workflows.
pub trait CommunicationAnalyzer: Send + Sync {
    fn analyze(&self, communication: &Communication) -> impl Future<Output = Result<Analysis, HubError>> + Send;

    fn draft_reply(
        &self,
        context: &str,
        channel: ReplyChannel,
        tone: Tone,
    ) -> impl Future<Output = Result<String, HubError>> + Send;
}

// ── Object-safe wrappers ────────────────────────────────────────────────────

pub trait ContextProviderDyn: Send + Sync {
    fn snapshot_dyn(&self) -> BoxFuture<'_, Result<BusinessSnapshot, HubError>>;
}

impl<T: ContextProvider> ContextProviderDyn for T {
    fn snapshot_dyn(&self) -> BoxFuture<'_, Result<BusinessSnapshot, HubError>> {
        Box::pin(self.snapshot())
    }
}

pub trait DecisionProviderDyn: Send + Sync {
    fn decide_dyn<'a>(
        &'a self,
        context: &'a str,
        available_servers: &'a [String],
    ) -> BoxFuture<'a, Result<Option<Action>, HubError>>;
}

impl<T: DecisionProvider> DecisionProviderDyn for T {
    fn decide_dyn<'a>(
        &'a self,
        context: &'a str,
        available_servers: &'a [String],
    ) -> BoxFuture<'a, Result<Option<Action>, HubError>> {
        Box::pin(self.decide(context, available_servers))
    }
}

pub trait CommunicationAnalyzerDyn: Send + Sync {
    fn analyze_dyn<'a>(&'a self, communication: &'a Communication) -> BoxFuture<'a, Result<Analysis, HubError>>;

    fn draft_reply_dyn<'a>(
        &'a self,
        context: &'a str,
        channel: ReplyChannel,
        tone: Tone,
    ) -> BoxFuture<'a, Result<String, HubError>>;
}

impl<T: CommunicationAnalyzer> CommunicationAnalyzerDyn for T {
    fn analyze_dyn<'a>(&'a self, communication: &'a Communication) -> BoxFuture<'a, Result<Analysis, HubError>> {
        Box::pin(self.analyze(communication))
    }

    fn draft_reply_dyn<'a>(
        &'a self,
        context: &'a str,
        channel: ReplyChannel,
        tone: Tone,
    ) -> BoxFuture<'a, Result<String, HubError>> {
        Box::pin(self.draft_reply(context, channel, tone))
    }
}

pub type SharedContextProvider = Arc<dyn ContextProviderDyn>;
pub type SharedDecisionProvider = Arc<dyn DecisionProviderDyn>;
pub type SharedAnalyzer = Arc<dyn CommunicationAnalyzerDyn>;

//! Built-in business workflows.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hub_protocol::{Methods, Params};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::HubError;
use crate::providers::{Analysis, Communication, ReplyChannel, Sentiment, SharedAnalyzer, Tone, Urgency};
use crate::workflow::{Step, Workflow, WorkflowContext};

pub const CREATE_JOB_FROM_EMAIL: &str = "create_job_from_email";
pub const SCHEDULE_JOB_WITH_NOTIFICATIONS: &str = "schedule_job_with_notifications";

const JOB_ALERTS_CHANNEL: &str = "#job-alerts";
const JOB_SCHEDULE_CHANNEL: &str = "#job-schedule";
const DEFAULT_JOB_DURATION_MINUTES: u64 = 120;
const FALLBACK_REPLY: &str = "Thank you for your message. We have received it and will get back to you shortly.";

// ─────────────────────────────────────────────────────────────────────────────
// create_job_from_email
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailInput {
    from: String,
    subject: String,
    content: String,
    #[serde(default)]
    customer_id: Option<String>,
}

/// Analyze an inbound email; open a job and alert the team when it is
/// urgent, and always send a drafted reply.
///
/// Input: `{from, subject, content, customerId?}`.
pub fn create_job_from_email(analyzer: SharedAnalyzer) -> Workflow {
    Workflow::new(CREATE_JOB_FROM_EMAIL)
        .describe("Create a job from a customer email and reply to the sender")
        .prepare(move |input| {
            let analyzer = analyzer.clone();
            async move {
                let email: EmailInput = parse_input(input)?;
                let communication = Communication {
                    kind: "email".into(),
                    content: email.content.clone(),
                    from_address: email.from.clone(),
                    customer_id: email.customer_id.clone(),
                };

                let analysis = match analyzer.analyze_dyn(&communication).await {
                    Ok(analysis) => analysis,
                    Err(e) => {
                        warn!("Communication analysis failed, using fallback: {e}");
                        Analysis::fallback(&email.content)
                    }
                };

                let tone = if analysis.sentiment == Sentiment::Negative {
                    Tone::Urgent
                } else {
                    Tone::Professional
                };
                let prompt = format!("Customer inquiry: {}", email.content);
                let reply = match analyzer.draft_reply_dyn(&prompt, ReplyChannel::Email, tone).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!("Reply drafting failed, using canned reply: {e}");
                        FALLBACK_REPLY.to_string()
                    }
                };

                let mut vars = Params::new();
                vars.insert("analysis".into(), to_value(&analysis)?);
                vars.insert("reply".into(), Value::String(reply));
                Ok::<_, HubError>(vars)
            }
        })
        .step(
            Step::new("create job", "jobber", Methods::JOBBER_CREATE_JOB)
                .when("urgency is not high", is_urgent)
                .params(|ctx| {
                    Ok(json!({
                        "title": ctx.input_str("subject")?,
                        "description": ctx.input_str("content")?,
                        "customerId": ctx.input["customerId"],
                        "priority": Urgency::High.as_str(),
                    }))
                }),
        )
        .step(
            Step::new("alert team", "slack", Methods::SLACK_SEND_MESSAGE)
                .when("urgency is not high", is_urgent)
                .params(|ctx| {
                    Ok(json!({
                        "channel": JOB_ALERTS_CHANNEL,
                        "message": format!(
                            "High priority job created: {}\nCustomer: {}",
                            ctx.input_str("subject")?,
                            ctx.input_str("from")?
                        ),
                    }))
                }),
        )
        .step(
            Step::new("reply to sender", "gmail", Methods::GMAIL_SEND_EMAIL).params(|ctx| {
                Ok(json!({
                    "to": ctx.input_str("from")?,
                    "subject": format!("Re: {}", ctx.input_str("subject")?),
                    "body": ctx.var("reply"),
                }))
            }),
        )
}

fn is_urgent(ctx: &WorkflowContext) -> bool {
    ctx.var("analysis")["urgency"] == Urgency::High.as_str()
}

// ─────────────────────────────────────────────────────────────────────────────
// schedule_job_with_notifications
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleInput {
    customer_id: String,
    title: String,
    #[serde(default)]
    description: String,
    scheduled_date: DateTime<Utc>,
    #[serde(default)]
    customer_phone: Option<String>,
}

/// Create a job, put it on the calendar, text the customer a reminder when a
/// phone number is known, and notify the team.
///
/// Input: `{customerId, title, description?, scheduledDate (RFC 3339),
/// customerPhone?, customerEmail?}`.
pub fn schedule_job_with_notifications() -> Workflow {
    Workflow::new(SCHEDULE_JOB_WITH_NOTIFICATIONS)
        .describe("Schedule a job and notify the customer and the team")
        .prepare(|input| async move {
            let job: ScheduleInput = parse_input(input)?;
            let reminder_at = job.scheduled_date - ChronoDuration::days(1);

            let mut vars = Params::new();
            vars.insert("customerId".into(), Value::String(job.customer_id));
            vars.insert("title".into(), Value::String(job.title));
            vars.insert("description".into(), Value::String(job.description));
            vars.insert("scheduledDate".into(), Value::String(job.scheduled_date.to_rfc3339()));
            vars.insert(
                "scheduledDisplay".into(),
                Value::String(job.scheduled_date.format("%Y-%m-%d %H:%M UTC").to_string()),
            );
            vars.insert("reminderAt".into(), Value::String(reminder_at.to_rfc3339()));
            vars.insert(
                "customerPhone".into(),
                job.customer_phone.map_or(Value::Null, Value::String),
            );
            Ok::<_, HubError>(vars)
        })
        .step(Step::new("create job", "jobber", Methods::JOBBER_CREATE_JOB).params(|ctx| Ok(ctx.input.clone())))
        .step(
            Step::new("add calendar event", "google-calendar", Methods::CALENDAR_CREATE_EVENT).params(|ctx| {
                Ok(json!({
                    "title": ctx.var("title"),
                    "description": ctx.var("description"),
                    "start": ctx.var("scheduledDate"),
                    "duration": DEFAULT_JOB_DURATION_MINUTES,
                }))
            }),
        )
        .step(
            Step::new("text customer reminder", "twilio", Methods::TWILIO_SEND_SMS)
                .when("no customer phone number", |ctx| ctx.var("customerPhone").is_string())
                .params(|ctx| {
                    Ok(json!({
                        "to": ctx.var("customerPhone"),
                        "message": format!(
                            "Reminder: your appointment \"{}\" is scheduled for {}",
                            ctx.var("title").as_str().unwrap_or_default(),
                            ctx.var("scheduledDisplay").as_str().unwrap_or_default()
                        ),
                        "sendAt": ctx.var("reminderAt"),
                    }))
                }),
        )
        .step(
            Step::new("notify team", "slack", Methods::SLACK_SEND_MESSAGE).params(|ctx| {
                Ok(json!({
                    "channel": JOB_SCHEDULE_CHANNEL,
                    "message": format!(
                        "New job scheduled: {}\nDate: {}\nCustomer ID: {}",
                        ctx.var("title").as_str().unwrap_or_default(),
                        ctx.var("scheduledDisplay").as_str().unwrap_or_default(),
                        ctx.var("customerId").as_str().unwrap_or_default()
                    ),
                }))
            }),
        )
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, HubError> {
    serde_json::from_value(input).map_err(|e| HubError::validation(format!("invalid workflow input: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, HubError> {
    serde_json::to_value(value).map_err(|e| HubError::provider(e.to_string()))
}

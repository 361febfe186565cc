//! Autonomous loop scheduling, failure containment and one-shot AI commands.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{ScriptedAdapter, ScriptedAnalyzer, ScriptedContext, ScriptedDecision};
use hub_core::{
    Action, CommandHub, HubConfig, HubError, HubEvent, Initiator, ListenerResult, LoopStats, ServerDescriptor,
};
use hub_protocol::{ErrorCode, Events, Methods, Params};
use parking_lot::Mutex;
use serde_json::json;

fn slack_ping() -> Action {
    let mut params = Params::new();
    params.insert("channel".into(), json!("#ops"));
    params.insert("text".into(), json!("status check"));
    Action::new("slack", Methods::SLACK_SEND_MESSAGE, params)
}

struct Harness {
    hub: CommandHub,
    adapter: Arc<ScriptedAdapter>,
    context: Arc<ScriptedContext>,
    decision: Arc<ScriptedDecision>,
}

async fn harness(decision: Arc<ScriptedDecision>) -> Harness {
    let mut config = HubConfig::empty();
    config.decision_timeout_ms = 1_000;
    let adapter = ScriptedAdapter::new();
    let context = ScriptedContext::new();
    let hub = CommandHub::builder(config)
        .context_provider(context.clone())
        .decision_provider(decision.clone())
        .analyzer(ScriptedAnalyzer::new(None, None))
        .build();

    let slack = ServerDescriptor::new("slack", "Slack").with_capabilities([Methods::SLACK_SEND_MESSAGE]);
    hub.register_server(slack, adapter.clone()).unwrap();
    assert!(hub.connect_server("slack").await.unwrap());

    Harness {
        hub,
        adapter,
        context,
        decision,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduling
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn ticks_immediately_then_every_interval() {
    let h = harness(ScriptedDecision::repeating(Some(slack_ping()))).await;

    assert!(h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap());
    assert!(!h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap());
    assert!(h.hub.autonomous_running());

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(
        h.hub.autonomous_stats(),
        LoopStats {
            ticks: 4,
            actions_dispatched: 4,
            failed_ticks: 0,
        }
    );
    assert_eq!(h.adapter.call_count(), 4);
    assert!(h.hub.recent_commands().iter().all(|c| c.initiated_by == Initiator::Automation));

    h.hub.stop_autonomous_loop().await;
}

#[tokio::test(start_paused = true)]
async fn no_ticks_after_stop() {
    let h = harness(ScriptedDecision::repeating(None)).await;
    h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(h.hub.stop_autonomous_loop().await);
    assert!(!h.hub.autonomous_running());
    let ticks = h.hub.autonomous_stats().ticks;
    assert_eq!(ticks, 2);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.hub.autonomous_stats().ticks, ticks);
    assert!(!h.hub.stop_autonomous_loop().await);
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop() {
    let h = harness(ScriptedDecision::repeating(None)).await;
    h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap();
    h.hub.stop_autonomous_loop().await;

    assert!(h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.hub.autonomous_running());
    h.hub.shutdown().await;
    assert!(!h.hub.autonomous_running());
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let h = harness(ScriptedDecision::repeating(None)).await;
    let err = h.hub.start_autonomous_loop_every(Duration::ZERO).unwrap_err();
    assert!(matches!(err, HubError::Validation { .. }));
}

#[tokio::test]
async fn loop_requires_providers() {
    let hub = CommandHub::builder(HubConfig::empty()).build();
    assert!(hub.start_autonomous_loop().is_err());
    assert!(hub.execute_ai_command("anything").await.is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick contents and failure containment
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn decision_sees_summary_and_connected_servers() {
    let h = harness(ScriptedDecision::repeating(None)).await;
    h.hub.start_autonomous_loop_every(Duration::from_secs(60)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.hub.stop_autonomous_loop().await;

    let seen = h.decision.seen();
    assert_eq!(seen.len(), 1);
    let (context, servers) = &seen[0];
    assert!(context.starts_with("Business Status Summary:"));
    assert!(context.contains("Active Jobs: 1"));
    assert_eq!(servers, &["slack".to_string()]);
    assert_eq!(h.hub.autonomous_stats().actions_dispatched, 0);
}

#[tokio::test(start_paused = true)]
async fn failures_never_stop_the_schedule() {
    let decision = ScriptedDecision::repeating(Some(slack_ping()));
    decision.push(Err(HubError::provider("model overloaded")));
    decision.panic_once();
    let h = harness(decision).await;

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    h.hub.subscribe(Events::AUTONOMOUS_TICK, move |e: &HubEvent| -> ListenerResult {
        if let HubEvent::AutonomousTick(report) = e {
            sink.lock().push(report.clone());
        }
        Ok(())
    });

    h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    h.hub.stop_autonomous_loop().await;

    // tick 1 panics, tick 2 gets an error, tick 3 dispatches.
    let stats = h.hub.autonomous_stats();
    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.failed_ticks, 2);
    assert_eq!(stats.actions_dispatched, 1);

    let reports = reports.lock();
    assert_eq!(reports.len(), 3);
    assert!(reports[0].error.is_some());
    assert!(reports[1].error.as_deref().unwrap().contains("model overloaded"));
    assert!(reports[2].error.is_none());
    assert_eq!(reports[2].action, Some(slack_ping()));
    assert!(reports[2].command_id.is_some());
}

#[tokio::test(start_paused = true)]
async fn context_failure_skips_the_decision() {
    let h = harness(ScriptedDecision::repeating(Some(slack_ping()))).await;
    h.context.set_failing(true);

    h.hub.start_autonomous_loop_every(Duration::from_millis(100)).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.context.set_failing(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.hub.stop_autonomous_loop().await;

    assert_eq!(h.context.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.decision.seen().len(), 1);
    assert_eq!(h.hub.autonomous_stats().failed_ticks, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_decision_times_out() {
    let decision = ScriptedDecision::repeating(Some(slack_ping()));
    decision.set_delay(Duration::from_secs(5));
    let h = harness(decision).await;

    h.hub.start_autonomous_loop_every(Duration::from_secs(60)).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.hub.stop_autonomous_loop().await;

    let stats = h.hub.autonomous_stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.failed_ticks, 1);
    assert_eq!(h.adapter.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_counts_as_failed_tick() {
    let mut params = Params::new();
    params.insert("to".into(), json!("+1555"));
    let h = harness(ScriptedDecision::repeating(Some(Action::new("twilio", Methods::TWILIO_SEND_SMS, params)))).await;

    h.hub.start_autonomous_loop_every(Duration::from_secs(60)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.hub.stop_autonomous_loop().await;

    let stats = h.hub.autonomous_stats();
    assert_eq!(stats.actions_dispatched, 1);
    assert_eq!(stats.failed_ticks, 1);
    let failed = &h.hub.recent_commands()[0];
    assert_eq!(failed.error, Some(HubError::server_not_found("twilio")));
}

// ─────────────────────────────────────────────────────────────────────────────
// One-shot AI commands
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ai_command_dispatches_suggestion() {
    let h = harness(ScriptedDecision::repeating(Some(slack_ping()))).await;

    let commands = h.hub.execute_ai_command("Customer asked for a status update").await.unwrap();

    assert_eq!(commands.len(), 1);
    assert!(commands[0].is_completed());
    assert_eq!(commands[0].initiated_by, Initiator::Ai);
    assert_eq!(h.decision.seen()[0].0, "Customer asked for a status update");
}

#[tokio::test]
async fn ai_command_with_no_suggestion_dispatches_nothing() {
    let h = harness(ScriptedDecision::repeating(None)).await;
    let commands = h.hub.execute_ai_command("nothing to do").await.unwrap();
    assert!(commands.is_empty());
    assert_eq!(h.adapter.call_count(), 0);
}

#[tokio::test]
async fn ai_command_surfaces_provider_errors() {
    let decision = ScriptedDecision::repeating(None);
    decision.push(Err(HubError::provider("quota exceeded")));
    let h = harness(decision).await;

    let err = h.hub.execute_ai_command("anything").await.unwrap_err();
    assert_eq!(err, HubError::provider("quota exceeded"));
}

#[tokio::test(start_paused = true)]
async fn slow_ai_decision_is_a_timeout() {
    let decision = ScriptedDecision::repeating(Some(slack_ping()));
    decision.set_delay(Duration::from_secs(5));
    let h = harness(decision).await;

    let err = h.hub.execute_ai_command("anything").await.unwrap_err();

    assert_eq!(err, HubError::timeout(Duration::from_secs(1)));
    assert_eq!(err.code(), ErrorCode::Timeout.code());
    assert_eq!(h.adapter.call_count(), 0);
}

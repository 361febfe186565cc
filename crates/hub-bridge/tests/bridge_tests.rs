//! Bridge protocol tests against an in-memory peer standing in for the
//! subprocess.

use std::sync::Arc;
use std::time::Duration;

use hub_bridge::{Bridge, BridgeError};
use hub_core::{
    BackendAdapter, Communication, CommunicationAnalyzer, ContextProvider, DecisionProvider, HubError, ReplyChannel,
    Sentiment, Tone, Urgency,
};
use hub_protocol::{ErrorCode, Methods, Params, Request};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

// ─────────────────────────────────────────────────────────────────────────────
// In-memory peer
// ─────────────────────────────────────────────────────────────────────────────

struct Peer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    async fn next_request(&mut self) -> Value {
        let line = self.lines.next_line().await.unwrap().expect("bridge closed its side");
        serde_json::from_str(&line).unwrap()
    }

    async fn write_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn reply(&mut self, request: &Value, mut body: Value) {
        body["id"] = request["id"].clone();
        self.write_line(&body.to_string()).await;
    }

    /// Answer every request with `handler`'s body; records what was received.
    fn serve<F>(mut self, handler: F) -> (Arc<Mutex<Vec<Value>>>, JoinHandle<()>)
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let task = tokio::spawn(async move {
            while let Ok(Some(line)) = self.lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                log.lock().push(request.clone());
                let body = handler(&request);
                self.reply(&request, body).await;
            }
        });
        (seen, task)
    }
}

fn connect(timeout: Duration) -> (Bridge, Peer) {
    let (bridge_side, peer_side) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(bridge_side);
    let bridge = Bridge::attach(reader, writer, timeout);

    let (peer_reader, peer_writer) = tokio::io::split(peer_side);
    let peer = Peer {
        lines: BufReader::new(peer_reader).lines(),
        writer: peer_writer,
    };
    (bridge, peer)
}

fn serving<F>(handler: F) -> (Bridge, Arc<Mutex<Vec<Value>>>)
where
    F: Fn(&Value) -> Value + Send + 'static,
{
    let (bridge, peer) = connect(Duration::from_secs(5));
    let (seen, _task) = peer.serve(handler);
    (bridge, seen)
}

// ─────────────────────────────────────────────────────────────────────────────
// Request multiplexing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn backend_send_keeps_the_command_id() {
    let (bridge, seen) = serving(|req| {
        json!({ "result": { "server": req["server"], "method": req["method"], "echo": req["params"] } })
    });

    let mut params = Params::new();
    params.insert("channel".into(), json!("#general"));
    let response = bridge
        .send("slack", Request::new("cmd-42", Methods::SLACK_SEND_MESSAGE, params))
        .await;

    assert_eq!(response.id, "cmd-42");
    assert!(response.is_success());
    let result = response.result.unwrap();
    assert_eq!(result["server"], "slack");
    assert_eq!(result["method"], Methods::SLACK_SEND_MESSAGE);
    assert_eq!(result["echo"]["channel"], "#general");

    let wire = seen.lock()[0].clone();
    assert!(wire["id"].as_str().unwrap().starts_with("b-"));
    assert_eq!(bridge.pending_requests(), 0);
}

#[tokio::test]
async fn remote_errors_become_failure_responses() {
    let (bridge, _) = serving(|_| json!({ "error": { "code": 429, "message": "rate limited" } }));

    let response = bridge
        .send("jobber", Request::new("cmd-7", Methods::JOBBER_CREATE_JOB, Params::new()))
        .await;

    assert_eq!(response.id, "cmd-7");
    let error = response.error.unwrap();
    assert_eq!(error.code, 429);
    assert_eq!(error.message, "rate limited");
}

#[tokio::test]
async fn responses_are_routed_by_id() {
    let (bridge, mut peer) = connect(Duration::from_secs(5));

    let peer_side = async {
        let first = peer.next_request().await;
        let second = peer.next_request().await;
        // Answer in reverse order.
        peer.reply(&second, json!({ "result": second["method"] })).await;
        peer.reply(&first, json!({ "result": first["method"] })).await;
    };

    let (a, b, ()) = tokio::join!(
        bridge.request("first", json!({}), None),
        bridge.request("second", json!({}), None),
        peer_side,
    );

    assert_eq!(a.unwrap(), "first");
    assert_eq!(b.unwrap(), "second");
}

#[tokio::test]
async fn noise_on_stdout_is_ignored() {
    let (bridge, mut peer) = connect(Duration::from_secs(5));

    let peer_side = async {
        let request = peer.next_request().await;
        peer.write_line("bridge starting up...").await;
        peer.write_line(r#"{"method":"log","params":{"level":"info"}}"#).await;
        peer.write_line(r#"{"id":"b-999","result":"stale"}"#).await;
        peer.reply(&request, json!({ "result": { "ok": true } })).await;
    };

    let (result, ()) = tokio::join!(bridge.request("ping", json!({}), None), peer_side);
    assert_eq!(result.unwrap(), json!({ "ok": true }));
}

#[tokio::test]
async fn missing_result_is_null() {
    let (bridge, _) = serving(|_| json!({}));
    assert_eq!(bridge.request("noop", json!({}), None).await.unwrap(), Value::Null);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure modes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() {
    let (bridge, _peer) = connect(Duration::from_secs(1));

    let err = bridge.request("slow", json!({}), None).await.unwrap_err();

    assert!(matches!(err, BridgeError::Timeout(1000)));
    assert_eq!(bridge.pending_requests(), 0);
    assert!(bridge.is_running());
}

#[tokio::test(start_paused = true)]
async fn caller_giving_up_first_clears_the_pending_entry() {
    let (bridge, _peer) = connect(Duration::from_secs(30));

    let gave_up = tokio::time::timeout(Duration::from_millis(100), bridge.request("hung", json!({}), None)).await;

    assert!(gave_up.is_err());
    assert_eq!(bridge.pending_requests(), 0);
    assert!(bridge.is_running());
}

#[tokio::test(start_paused = true)]
async fn timeout_surfaces_as_protocol_timeout() {
    let (bridge, _peer) = connect(Duration::from_millis(250));

    let response = bridge
        .send("gmail", Request::new("cmd-1", Methods::GMAIL_GET_EMAILS, Params::new()))
        .await;

    assert_eq!(response.id, "cmd-1");
    assert_eq!(response.error.unwrap().error_code(), ErrorCode::Timeout);
}

#[tokio::test]
async fn peer_exit_fails_waiters_and_later_requests() {
    let (bridge, mut peer) = connect(Duration::from_secs(5));

    let peer_side = async move {
        peer.next_request().await;
        drop(peer);
    };

    let (result, ()) = tokio::join!(bridge.request("doomed", json!({}), None), peer_side);

    assert!(matches!(result, Err(BridgeError::ResponseDropped)));
    assert!(!bridge.is_running());
    assert!(matches!(
        bridge.request("after", json!({}), None).await,
        Err(BridgeError::NotRunning)
    ));
}

#[tokio::test]
async fn shutdown_rejects_new_requests() {
    let (bridge, _) = serving(|_| json!({ "result": null }));
    bridge.shutdown().await;

    assert!(!bridge.is_running());
    let response = bridge
        .send("slack", Request::new("cmd-9", Methods::SLACK_GET_CHANNELS, Params::new()))
        .await;
    assert_eq!(response.id, "cmd-9");
    assert_eq!(response.error.unwrap().error_code(), ErrorCode::InternalError);
}

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_asks_the_server() {
    let (bridge, seen) = serving(|req| match req["server"].as_str() {
        Some("slack") => json!({ "result": { "status": "ok" } }),
        _ => json!({ "result": { "status": "degraded" } }),
    });

    assert!(bridge.probe("slack").await.is_ok());
    assert!(bridge.probe("twilio").await.is_err());

    let seen = seen.lock();
    assert!(seen.iter().all(|r| r["method"] == Methods::HEALTH));
}

#[tokio::test]
async fn snapshot_decodes_business_state() {
    let (bridge, _) = serving(|_| {
        json!({ "result": {
            "customers": [{ "name": "Ada" }],
            "jobs": [{ "title": "Roof", "status": "in_progress" }],
            "metrics": { "revenue": { "thisMonth": 1200 } }
        } })
    });

    let snapshot = bridge.snapshot().await.unwrap();
    assert_eq!(snapshot.customers.len(), 1);
    assert!(snapshot.communications.is_empty());
    assert!(snapshot.summary().contains("Active Jobs: 1"));
}

#[tokio::test]
async fn decide_sends_context_and_servers() {
    let (bridge, seen) = serving(|req| {
        if req["params"]["context"] == "quiet day" {
            json!({ "result": null })
        } else {
            json!({ "result": { "action": "slack", "method": "send_message", "params": { "text": "hi" } } })
        }
    });
    let servers = vec!["slack".to_string(), "gmail".to_string()];

    assert_eq!(bridge.decide("quiet day", &servers).await.unwrap(), None);

    let action = bridge.decide("angry customer", &servers).await.unwrap().unwrap();
    assert_eq!(action.server, "slack");
    assert_eq!(action.method, "send_message");
    assert_eq!(action.params["text"], "hi");

    let request = seen.lock()[1].clone();
    assert_eq!(request["method"], Methods::HUB_DECIDE);
    assert_eq!(request["params"]["availableServers"], json!(["slack", "gmail"]));
    assert!(request.get("server").is_none());
}

#[tokio::test]
async fn malformed_decision_is_a_provider_error() {
    let (bridge, _) = serving(|_| json!({ "result": { "unexpected": true } }));
    let err = bridge.decide("ctx", &[]).await.unwrap_err();
    assert!(matches!(err, HubError::Provider { .. }));
}

#[tokio::test]
async fn analyze_and_draft_reply() {
    let (bridge, seen) = serving(|req| match req["method"].as_str() {
        Some(Methods::HUB_ANALYZE) => json!({ "result": {
            "sentiment": "negative",
            "urgency": "high",
            "suggestedActions": ["Call back"],
            "summary": "Leak"
        } }),
        _ if req["params"]["tone"] == "urgent" => json!({ "result": "On our way." }),
        _ => json!({ "result": { "reply": "Thanks for reaching out." } }),
    });

    let communication = Communication {
        kind: "email".into(),
        content: "Water everywhere".into(),
        from_address: "ada@example.com".into(),
        customer_id: None,
    };
    let analysis = bridge.analyze(&communication).await.unwrap();
    assert_eq!(analysis.sentiment, Sentiment::Negative);
    assert_eq!(analysis.urgency, Urgency::High);

    let urgent = bridge.draft_reply("leak", ReplyChannel::Email, Tone::Urgent).await.unwrap();
    assert_eq!(urgent, "On our way.");
    let calm = bridge
        .draft_reply("quote", ReplyChannel::Sms, Tone::Professional)
        .await
        .unwrap();
    assert_eq!(calm, "Thanks for reaching out.");

    let sent = seen.lock()[0].clone();
    assert_eq!(sent["params"]["communication"]["fromAddress"], "ada@example.com");
    assert_eq!(sent["params"]["communication"]["type"], "email");
}

#[tokio::test]
async fn remote_failure_is_a_provider_error() {
    let (bridge, _) = serving(|_| json!({ "error": { "code": -32000, "message": "model unavailable" } }));
    match bridge.snapshot().await.unwrap_err() {
        HubError::Provider { message } => assert!(message.contains("model unavailable")),
        other => panic!("expected provider error, got {other:?}"),
    }
}

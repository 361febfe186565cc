//! Hub collaborator implementations backed by the bridge subprocess.

use hub_core::{
    Action, Analysis, BackendAdapter, BusinessSnapshot, Communication, CommunicationAnalyzer, ContextProvider,
    DecisionProvider, HubError, ReplyChannel, Tone,
};
use hub_protocol::{Methods, Request, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{Bridge, BridgeError};

impl BackendAdapter for Bridge {
    async fn send(&self, server_id: &str, request: Request) -> Response {
        match self
            .request(&request.method, Value::Object(request.params), Some(server_id))
            .await
        {
            Ok(result) => Response::success(request.id, result),
            Err(e) => Response::failure(request.id, e.into()),
        }
    }
}

impl ContextProvider for Bridge {
    async fn snapshot(&self) -> Result<BusinessSnapshot, HubError> {
        let value = self.call(Methods::HUB_CONTEXT, json!({})).await?;
        decode(value)
    }
}

impl DecisionProvider for Bridge {
    async fn decide(&self, context: &str, available_servers: &[String]) -> Result<Option<Action>, HubError> {
        let value = self
            .call(
                Methods::HUB_DECIDE,
                json!({ "context": context, "availableServers": available_servers }),
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        decode(value).map(Some)
    }
}

impl CommunicationAnalyzer for Bridge {
    async fn analyze(&self, communication: &Communication) -> Result<Analysis, HubError> {
        let value = self
            .call(Methods::HUB_ANALYZE, json!({ "communication": communication }))
            .await?;
        decode(value)
    }

    async fn draft_reply(&self, context: &str, channel: ReplyChannel, tone: Tone) -> Result<String, HubError> {
        let value = self
            .call(
                Methods::HUB_DRAFT_REPLY,
                json!({ "context": context, "channel": channel, "tone": tone }),
            )
            .await?;
        match value {
            Value::String(reply) => Ok(reply),
            other => other["reply"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| HubError::provider("draft reply response has no text")),
        }
    }
}

impl Bridge {
    async fn call(&self, method: &str, params: Value) -> Result<Value, HubError> {
        self.request(method, params, None).await.map_err(provider_error)
    }
}

fn provider_error(err: BridgeError) -> HubError {
    HubError::provider(err.to_string())
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, HubError> {
    serde_json::from_value(value).map_err(|e| provider_error(BridgeError::Payload(e.to_string())))
}

//! Client side of the secondary tool-call channel.
//!
//! One [`ToolBridge`] per process. The session is opened lazily on first use
//! under a mutex, so racing callers share a single connection.

use super::CapabilityResponse;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of a tool call. Consumers read `data`, then `structured_content`,
/// then `content`, and take the first one that is present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResult {
    pub data: Option<Value>,
    pub structured_content: Option<Value>,
    pub content: Option<Value>,
}

impl ToolResult {
    /// Build from a `tools/call` result object.
    pub fn from_call_result(result: &Value) -> Self {
        let structured_content = result
            .get("structuredContent")
            .filter(|v| !v.is_null())
            .cloned();

        // Servers that wrap scalar outputs return {"result": <value>}.
        let data = structured_content.as_ref().map(|sc| match sc.as_object() {
            Some(obj) if obj.len() == 1 && obj.contains_key("result") => obj["result"].clone(),
            _ => sc.clone(),
        });

        Self {
            data,
            structured_content,
            content: result.get("content").filter(|v| !v.is_null()).cloned(),
        }
    }

    /// Pick the authoritative payload. Never merges the three fields.
    pub fn into_response(self, tool: &str) -> Result<CapabilityResponse> {
        let authoritative = [self.data, self.structured_content]
            .into_iter()
            .flatten()
            .find(is_present);

        match authoritative {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(OrchestratorError::malformed(
                tool,
                format!("expected an object payload, got {}", kind_of(&other)),
            )),
            None => {
                let mut fallback = Map::new();
                fallback.insert("status".to_string(), json!("fallback"));
                fallback.insert(
                    "payload".to_string(),
                    self.content.unwrap_or_else(|| Value::Object(Map::new())),
                );
                Ok(fallback)
            }
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// An open connection to the tool-call endpoint.
#[async_trait]
pub trait ToolSession: Send + Sync + fmt::Debug {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult>;

    async fn close(&self) -> Result<()>;
}

/// Opens sessions against an endpoint.
#[async_trait]
pub trait ToolTransport: Send + Sync + fmt::Debug {
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn ToolSession>>;
}

pub struct ToolBridge {
    endpoint: Option<String>,
    transport: Arc<dyn ToolTransport>,
    session: Mutex<Option<Arc<dyn ToolSession>>>,
}

impl fmt::Debug for ToolBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connected = self.session.try_lock().map(|s| s.is_some()).unwrap_or(true);
        f.debug_struct("ToolBridge")
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .field("connected", &connected)
            .finish()
    }
}

impl ToolBridge {
    pub fn new(endpoint: Option<String>, transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            endpoint,
            transport,
            session: Mutex::new(None),
        }
    }

    pub fn over_http(endpoint: Option<String>, client: reqwest::Client) -> Self {
        Self::new(endpoint, Arc::new(HttpToolTransport::new(client)))
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Open the session if there is none. No-op without an endpoint.
    pub async fn connect(&self) -> Result<()> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(());
        };

        let mut slot = self.session.lock().await;
        if slot.is_none() {
            let session = self.transport.open(endpoint).await?;
            info!(endpoint = %endpoint, "tool bridge connected");
            *slot = Some(session);
        }
        Ok(())
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        if self.endpoint.is_none() {
            return Err(OrchestratorError::Configuration(
                "tool-call endpoint not configured".to_string(),
            ));
        }

        self.connect().await?;
        let session = self
            .session
            .lock()
            .await
            .clone()
            .ok_or_else(|| {
                OrchestratorError::transport("tool-bridge", "session closed during call")
            })?;

        debug!(tool = name, "invoking tool");
        let result = session.call_tool(name, arguments).await;

        if let Err(e) = &result {
            if e.is_transport() {
                self.discard(&session).await;
            }
        }
        result
    }

    /// Close the session if one is open. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                warn!(error = %e, "error closing tool bridge session");
            }
            info!("tool bridge disconnected");
        }
        Ok(())
    }

    /// Drop a session that failed at the transport level so the next call
    /// reconnects, and close it. Leaves a newer session alone.
    async fn discard(&self, failed: &Arc<dyn ToolSession>) {
        let dropped = {
            let mut slot = self.session.lock().await;
            let is_current = slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, failed));
            if is_current {
                slot.take()
            } else {
                None
            }
        };
        if let Some(session) = dropped {
            warn!("tool bridge session dropped after transport failure");
            if let Err(e) = session.close().await {
                debug!(error = %e, "closing dropped tool bridge session failed");
            }
        }
    }
}

/// JSON-RPC 2.0 over streamable HTTP.
#[derive(Debug, Clone)]
pub struct HttpToolTransport {
    client: reqwest::Client,
}

impl HttpToolTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolTransport for HttpToolTransport {
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn ToolSession>> {
        let mut session = HttpToolSession {
            client: self.client.clone(),
            endpoint: endpoint.to_string(),
            session_id: None,
            next_id: AtomicU64::new(1),
        };

        let init = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
        });
        let (response, session_id) = session.request("initialize", init).await?;
        if response.get("result").is_none() {
            return Err(OrchestratorError::malformed(endpoint, "initialize returned no result"));
        }
        session.session_id = session_id;
        session.notify("notifications/initialized").await?;

        Ok(Arc::new(session))
    }
}

#[derive(Debug)]
struct HttpToolSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: Option<String>,
    next_id: AtomicU64,
}

impl HttpToolSession {
    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .timeout(TOOL_CALL_TIMEOUT)
            .json(body);
        if let Some(id) = &self.session_id {
            req = req.header(SESSION_HEADER, id);
        }
        req
    }

    async fn request(&self, method: &str, params: Value) -> Result<(Value, Option<String>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let response = self.post(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::transport(
                &self.endpoint,
                format!("{method} returned {status}"),
            ));
        }

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let message = if is_stream {
            read_event_stream(response.bytes_stream(), id)
                .await
                .map_err(|e| OrchestratorError::transport(&self.endpoint, e))?
                .ok_or_else(|| {
                    let detail = "no JSON-RPC reply in event stream";
                    OrchestratorError::malformed(&self.endpoint, detail)
                })?
        } else {
            let text = response.text().await?;
            serde_json::from_str(&text)
                .map_err(|e| OrchestratorError::malformed(&self.endpoint, e))?
        };

        if let Some(error) = message.get("error") {
            return Err(OrchestratorError::tool_failure(
                &self.endpoint,
                format!("{method} failed: {error}"),
            ));
        }
        Ok((message, session_id))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        let response = self.post(&body).send().await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::transport(
                &self.endpoint,
                format!("{method} returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ToolSession for HttpToolSession {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let (message, _) = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        let result = message
            .get("result")
            .ok_or_else(|| OrchestratorError::malformed(name, "tools/call returned no result"))?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            let detail = result.get("content").unwrap_or(&Value::Null);
            return Err(OrchestratorError::tool_failure(name, detail));
        }
        Ok(ToolResult::from_call_result(result))
    }

    async fn close(&self) -> Result<()> {
        let Some(id) = &self.session_id else {
            return Ok(());
        };
        let response = self
            .client
            .delete(&self.endpoint)
            .header(SESSION_HEADER, id)
            .send()
            .await?;
        // Servers may refuse client-initiated termination.
        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(OrchestratorError::transport(
                &self.endpoint,
                format!("session delete returned {status}"),
            ));
        }
        Ok(())
    }
}

/// Read SSE events until the JSON-RPC reply with `id` arrives. Server
/// notifications and non-JSON events before it are skipped.
async fn read_event_stream<S, B, E>(
    body: S,
    id: u64,
) -> std::result::Result<Option<Value>, String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut events = std::pin::pin!(body.eventsource());
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| e.to_string())?;
        if event.data.is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&event.data) else {
            continue;
        };
        if message.get("id").and_then(Value::as_u64) == Some(id) {
            return Ok(Some(message));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_wins_over_everything() {
        let result = ToolResult {
            data: Some(json!({"quest_id": "q-1"})),
            structured_content: Some(json!({"quest_id": "q-2"})),
            content: Some(json!([{"type": "text", "text": "q-3"}])),
        };
        let response = result.into_response("generate_quest").unwrap();
        assert_eq!(response["quest_id"], "q-1");
        assert_eq!(response.len(), 1);
    }

    #[test]
    fn test_empty_data_falls_to_structured_content() {
        let result = ToolResult {
            data: Some(json!({})),
            structured_content: Some(json!({"is_anomaly": true})),
            content: None,
        };
        let response = result.into_response("check_fraud_risk").unwrap();
        assert_eq!(response["is_anomaly"], true);
    }

    #[test]
    fn test_raw_content_is_wrapped_as_fallback() {
        let result = ToolResult {
            data: None,
            structured_content: None,
            content: Some(json!([{"type": "text", "text": "ok"}])),
        };
        let response = result.into_response("optimize_economy").unwrap();
        assert_eq!(response["status"], "fallback");
        assert_eq!(response["payload"][0]["text"], "ok");

        let empty = ToolResult::default().into_response("optimize_economy").unwrap();
        assert_eq!(empty["payload"], json!({}));
    }

    #[test]
    fn test_non_object_payload_is_malformed() {
        let result = ToolResult {
            data: Some(json!("just a string")),
            ..Default::default()
        };
        assert!(matches!(
            result.into_response("generate_quest"),
            Err(OrchestratorError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_from_call_result_unwraps_result_key() {
        let wrapped = json!({
            "content": [{"type": "text", "text": "{}"}],
            "structuredContent": {"result": {"quest_id": "q-9"}},
        });
        let result = ToolResult::from_call_result(&wrapped);
        assert_eq!(result.data, Some(json!({"quest_id": "q-9"})));
        assert!(result.structured_content.is_some());
        assert!(result.content.is_some());

        let plain = ToolResult::from_call_result(&json!({"content": []}));
        assert!(plain.data.is_none());
        assert!(plain.structured_content.is_none());
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, String>> {
        let owned: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(owned)
    }

    #[tokio::test]
    async fn test_event_stream_picks_matching_id() {
        // Reply split across chunks, CRLF framing, a notification first
        let body = chunks(&[
            "event: message\r\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\r\n\r\n",
            "event: message\r\ndata: {\"jsonrpc\":\"2.0\",",
            "\"id\":7,\"result\":{\"ok\":true}}\r\n\r\n",
        ]);
        let reply = read_event_stream(body, 7).await.unwrap().unwrap();
        assert_eq!(reply["result"]["ok"], true);
    }

    #[tokio::test]
    async fn test_event_stream_without_reply() {
        let body = chunks(&[": keepalive\n\n", "data: not json\n\n", "data: {\"id\":3}\n\n"]);
        assert!(read_event_stream(body, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_stream_transport_error_surfaces() {
        let body = futures::stream::iter(vec![
            Ok(b"data: {\"id\":1,".to_vec()),
            Err("connection reset".to_string()),
        ]);
        let err = read_event_stream(body, 1).await.unwrap_err();
        assert!(err.contains("connection reset"));
    }
}

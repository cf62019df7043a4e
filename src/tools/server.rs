//! Serves a [`ToolRouter`] as JSON-RPC 2.0 over HTTP, the dialect the tool
//! bridge client speaks: `initialize` hands out a session id, notifications
//! are acknowledged with 202, and `DELETE` ends a session.

use super::ToolRouter;
use crate::error::{OrchestratorError, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ToolServerConfig {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    /// Route with exactly one leading slash.
    pub fn route(&self) -> String {
        format!("/{}", self.path.trim_matches('/'))
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

impl RpcError {
    const INVALID_REQUEST: i32 = -32600;
    const METHOD_NOT_FOUND: i32 = -32601;
    const INVALID_PARAMS: i32 = -32602;

    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

type RpcOutcome = std::result::Result<Value, RpcError>;

fn reply(id: Value, outcome: RpcOutcome) -> Json<Value> {
    match outcome {
        Ok(result) => Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })),
        Err(error) => Json(json!({ "jsonrpc": "2.0", "id": id, "error": error })),
    }
}

#[derive(Debug, Clone)]
struct ServerState {
    tools: ToolRouter,
    sessions: Arc<Mutex<HashSet<String>>>,
}

/// A bound tool endpoint, not yet serving.
#[derive(Debug)]
pub struct ToolServer {
    listener: TcpListener,
    app: Router,
    url: String,
}

impl ToolServer {
    /// Bind the listener now so a bad address fails at boot, not later.
    pub async fn bind(config: &ToolServerConfig, tools: ToolRouter) -> Result<Self> {
        let addr = config.bind_addr();
        let bind_error = |e: std::io::Error| {
            OrchestratorError::Configuration(format!("tool server {addr}: {e}"))
        };
        let listener = TcpListener::bind(&addr).await.map_err(bind_error)?;
        let local = listener.local_addr().map_err(bind_error)?;
        let route = config.route();

        Ok(Self {
            listener,
            app: router(tools, &route),
            url: format!("http://{local}{route}"),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serve until `cancel` fires. Calls already in flight run to completion.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let Self { listener, app, url } = self;
        info!(url = %url, "tool server listening");
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await;
            match served {
                Ok(()) => info!(url = %url, "tool server stopped"),
                Err(e) => warn!(url = %url, error = %e, "tool server failed"),
            }
        })
    }
}

pub fn router(tools: ToolRouter, route: &str) -> Router {
    let state = ServerState {
        tools,
        sessions: Arc::default(),
    };
    Router::new()
        .route(route, post(handle_rpc).delete(close_session))
        .with_state(state)
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

async fn handle_rpc(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(message): Json<Value>,
) -> Response {
    let request: RpcRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            let error = RpcError::new(RpcError::INVALID_REQUEST, e.to_string());
            return reply(Value::Null, Err(error)).into_response();
        }
    };
    let Some(id) = request.id else {
        debug!(method = %request.method, "tool client notification");
        return StatusCode::ACCEPTED.into_response();
    };

    if request.method == "initialize" {
        let session = Uuid::new_v4().to_string();
        state.sessions.lock().insert(session.clone());
        info!(session = %session, "tool client session opened");
        let result = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
        });
        return ([(SESSION_HEADER, session)], reply(id, Ok(result))).into_response();
    }

    // Clients without a session header are served statelessly
    if let Some(session) = session_id(&headers) {
        if !state.sessions.lock().contains(session) {
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    let outcome = match request.method.as_str() {
        "ping" => Ok(json!({})),
        "tools/list" => Ok(list_tools(&state.tools)),
        "tools/call" => call_tool(&state.tools, &request.params).await,
        other => Err(RpcError::new(
            RpcError::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    };
    reply(id, outcome).into_response()
}

async fn close_session(State(state): State<ServerState>, headers: HeaderMap) -> StatusCode {
    let Some(session) = session_id(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if state.sessions.lock().remove(session) {
        info!(session = %session, "tool client session closed");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

fn list_tools(tools: &ToolRouter) -> Value {
    let tools: Vec<Value> = tools
        .tools()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema(),
            })
        })
        .collect();
    json!({ "tools": tools })
}

/// Unknown tools and bad arguments are protocol errors. A capability that
/// ran and failed is a normal result with `isError` set.
async fn call_tool(tools: &ToolRouter, params: &Value) -> RpcOutcome {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::new(RpcError::INVALID_PARAMS, "missing tool name"))?;
    let empty = json!({});
    let arguments = params
        .get("arguments")
        .filter(|v| !v.is_null())
        .unwrap_or(&empty);

    match tools.call(name, arguments).await {
        Ok(response) => {
            let structured = Value::Object(response);
            Ok(json!({
                "content": [{ "type": "text", "text": structured.to_string() }],
                "structuredContent": structured,
                "isError": false,
            }))
        }
        Err(e @ (OrchestratorError::UnknownTool(_) | OrchestratorError::InvalidInput(_))) => {
            Err(RpcError::new(RpcError::INVALID_PARAMS, e.to_string()))
        }
        Err(e) => {
            warn!(tool = name, error = %e, "tool call failed");
            Ok(json!({
                "content": [{ "type": "text", "text": e.to_string() }],
                "isError": true,
            }))
        }
    }
}

#![allow(dead_code)]

use agent_gateway::services::agents::{
    AgentEndpoint, EconomyDispatcher, QuestDispatcher, SecurityDispatcher,
};
use agent_gateway::services::ToolBridge;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Nothing listens on port 1.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn json_post(path: &str, body: Value) -> Router {
    Router::new().route(
        path,
        post(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    )
}

pub fn json_get(path: &str, body: Value) -> Router {
    Router::new().route(
        path,
        get(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    )
}

pub fn failing_post(path: &str) -> Router {
    Router::new().route(path, post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
}

/// Minimal tool-call server. Every `tools/call` answers with `result`, as a
/// JSON-RPC error when `rpc_error` is set, or as an SSE stream when
/// `streaming` is set.
#[derive(Clone)]
pub struct ToolServer {
    pub result: Value,
    pub rpc_error: Option<Value>,
    pub streaming: bool,
    pub initializes: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl ToolServer {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            rpc_error: None,
            streaming: false,
            initializes: Arc::new(AtomicUsize::new(0)),
            deletes: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn streaming(result: Value) -> Self {
        Self {
            streaming: true,
            ..Self::new(result)
        }
    }

    pub fn rpc_error(code: i64, message: &str) -> Self {
        Self {
            rpc_error: Some(json!({ "code": code, "message": message })),
            ..Self::new(Value::Null)
        }
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Serve on `/mcp` and return the endpoint URL.
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/mcp", post(tool_rpc).delete(tool_delete))
            .with_state(self.clone());
        format!("{}/mcp", serve(router).await)
    }

    pub fn initialize_count(&self) -> usize {
        self.initializes.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

async fn tool_rpc(State(server): State<ToolServer>, Json(message): Json<Value>) -> Response {
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    match message["method"].as_str().unwrap_or_default() {
        "initialize" => {
            server.initializes.fetch_add(1, Ordering::SeqCst);
            let reply = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "mock-supervisor", "version": "0.0.0" }
                }
            });
            ([("mcp-session-id", "session-1")], Json(reply)).into_response()
        }
        "tools/call" => {
            server.calls.lock().unwrap().push(message["params"].clone());
            if let Some(error) = &server.rpc_error {
                return Json(json!({ "jsonrpc": "2.0", "id": id, "error": error })).into_response();
            }
            let reply = json!({ "jsonrpc": "2.0", "id": id, "result": server.result });
            if !server.streaming {
                return Json(reply).into_response();
            }
            let progress = json!({ "jsonrpc": "2.0", "method": "notifications/progress" });
            let body = format!(
                "event: message\ndata: {}\n\nevent: message\ndata: {}\n\n",
                progress, reply
            );
            ([("content-type", "text/event-stream")], body).into_response()
        }
        _ => StatusCode::ACCEPTED.into_response(),
    }
}

async fn tool_delete(State(server): State<ToolServer>) -> StatusCode {
    server.deletes.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

pub fn bridge(endpoint: Option<String>) -> Arc<ToolBridge> {
    Arc::new(ToolBridge::over_http(endpoint, reqwest::Client::new()))
}

pub fn quest_dispatcher(base: &str, bridge: Arc<ToolBridge>) -> QuestDispatcher {
    QuestDispatcher::new(AgentEndpoint::new("quest", base, reqwest::Client::new()), bridge, TIMEOUT)
}

pub fn economy_dispatcher(base: &str, bridge: Arc<ToolBridge>) -> EconomyDispatcher {
    EconomyDispatcher::new(
        AgentEndpoint::new("economy", base, reqwest::Client::new()),
        bridge,
        TIMEOUT,
        TIMEOUT,
    )
    .with_seed(7)
}

pub fn security_dispatcher(base: &str, bridge: Arc<ToolBridge>) -> SecurityDispatcher {
    let endpoint = AgentEndpoint::new("security", base, reqwest::Client::new());
    SecurityDispatcher::new(endpoint, bridge, TIMEOUT)
}

pub fn sample_profile(reputation: f64, xp: i64) -> Value {
    json!({
        "user_identity": {
            "wallet_id": "0xabc",
            "xp_balance": xp,
            "reputation_score": reputation,
        },
        "recent_events": [{"kind": "login"}],
        "total_quests_completed": 4,
        "average_completion_time": 12.5,
    })
}

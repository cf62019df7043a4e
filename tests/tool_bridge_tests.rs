mod common;

use agent_gateway::services::{ToolBridge, ToolResult, ToolSession, ToolTransport};
use agent_gateway::{OrchestratorError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    calls: AtomicUsize,
    fail_next_call: AtomicBool,
    reject_calls: AtomicBool,
}

#[derive(Debug)]
struct CountingTransport {
    counters: Arc<Counters>,
}

#[derive(Debug)]
struct CountingSession {
    counters: Arc<Counters>,
}

#[async_trait]
impl ToolTransport for CountingTransport {
    async fn open(&self, _endpoint: &str) -> Result<Arc<dyn ToolSession>> {
        // Widen the race window
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingSession {
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[async_trait]
impl ToolSession for CountingSession {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_next_call.swap(false, Ordering::SeqCst) {
            return Err(OrchestratorError::transport(name, "connection reset"));
        }
        if self.counters.reject_calls.load(Ordering::SeqCst) {
            return Err(OrchestratorError::tool_failure(name, "quota exceeded"));
        }
        Ok(ToolResult {
            data: Some(json!({ "tool": name, "echo": arguments })),
            ..ToolResult::default()
        })
    }

    async fn close(&self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counting_bridge(endpoint: Option<&str>) -> (Arc<ToolBridge>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let transport = Arc::new(CountingTransport {
        counters: Arc::clone(&counters),
    });
    (
        Arc::new(ToolBridge::new(endpoint.map(str::to_string), transport)),
        counters,
    )
}

#[tokio::test]
async fn test_concurrent_connects_open_one_session() {
    let (bridge, counters) = counting_bridge(Some("http://supervisor/mcp"));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.connect().await })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
    assert!(bridge.is_connected().await);
}

#[tokio::test]
async fn test_concurrent_invokes_share_lazy_session() {
    let (bridge, counters) = counting_bridge(Some("http://supervisor/mcp"));

    let calls = (0..8).map(|i| {
        let bridge = Arc::clone(&bridge);
        async move { bridge.invoke("check_fraud_risk", json!({ "user_id": i })).await }
    });
    for result in futures::future::join_all(calls).await {
        assert!(result.is_ok());
    }

    assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_unconfigured_bridge() {
    let (bridge, counters) = counting_bridge(None);

    // 1. connect is a no-op
    bridge.connect().await.unwrap();
    assert!(!bridge.is_connected().await);

    // 2. invoke is a configuration error
    let err = bridge.invoke("generate_quest", json!({})).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Configuration(_)));
    assert_eq!(counters.opens.load(Ordering::SeqCst), 0);

    // 3. disconnect is harmless
    bridge.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (bridge, counters) = counting_bridge(Some("http://supervisor/mcp"));

    bridge.disconnect().await.unwrap();
    bridge.connect().await.unwrap();
    bridge.disconnect().await.unwrap();
    bridge.disconnect().await.unwrap();

    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    assert!(!bridge.is_connected().await);

    // Next use reconnects lazily
    bridge.invoke("optimize_economy", json!({})).await.unwrap();
    assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transport_failure_drops_session() {
    let (bridge, counters) = counting_bridge(Some("http://supervisor/mcp"));
    bridge.connect().await.unwrap();

    counters.fail_next_call.store(true, Ordering::SeqCst);
    assert!(bridge.invoke("generate_quest", json!({})).await.is_err());
    assert!(!bridge.is_connected().await);

    bridge.invoke("generate_quest", json!({})).await.unwrap();
    assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
    // The dropped session was closed, not leaked
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tool_failure_keeps_session() {
    let (bridge, counters) = counting_bridge(Some("http://supervisor/mcp"));
    counters.reject_calls.store(true, Ordering::SeqCst);

    for _ in 0..3 {
        let err = bridge.invoke("check_fraud_risk", json!({})).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolFailure { .. }));
        assert!(!err.is_transport());
    }

    assert!(bridge.is_connected().await);
    assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_http_session_lifecycle() {
    let tools = common::ToolServer::new(json!({
        "structuredContent": { "result": { "quest_id": "q-1" } }
    }));
    let endpoint = tools.start().await;
    let bridge = common::bridge(Some(endpoint));

    let result = bridge.invoke("generate_quest", json!({ "user_profile": {} })).await.unwrap();
    assert_eq!(result.data, Some(json!({ "quest_id": "q-1" })));
    assert_eq!(
        result.into_response("generate_quest").unwrap()["quest_id"],
        "q-1"
    );

    bridge.invoke("generate_quest", json!({ "user_profile": {} })).await.unwrap();
    assert_eq!(tools.initialize_count(), 1);

    bridge.disconnect().await.unwrap();
    bridge.disconnect().await.unwrap();
    assert_eq!(tools.delete_count(), 1);
}

#[tokio::test]
async fn test_http_connect_failure_is_transport() {
    let bridge = common::bridge(Some(format!("{}/mcp", common::UNREACHABLE)));
    let err = bridge.connect().await.unwrap_err();
    assert!(err.is_transport());
    assert!(!bridge.is_connected().await);
}

#[tokio::test]
async fn test_http_error_result_reuses_session() {
    let tools = common::ToolServer::new(json!({
        "isError": true,
        "content": [{ "type": "text", "text": "user not found" }]
    }));
    let bridge = common::bridge(Some(tools.start().await));

    for _ in 0..3 {
        let err = bridge.invoke("check_fraud_risk", json!({ "user_id": "u-1" })).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ToolFailure { .. }));
    }

    assert_eq!(tools.initialize_count(), 1);
    assert_eq!(tools.delete_count(), 0);
    assert!(bridge.is_connected().await);
}

#[tokio::test]
async fn test_http_rpc_error_reuses_session() {
    let tools = common::ToolServer::rpc_error(-32602, "unknown tool: mint_tokens");
    let bridge = common::bridge(Some(tools.start().await));

    for _ in 0..2 {
        let err = bridge.invoke("mint_tokens", json!({})).await.unwrap_err();
        match err {
            OrchestratorError::ToolFailure { message, .. } => {
                assert!(message.contains("unknown tool"));
            }
            other => panic!("expected tool failure, got {other:?}"),
        }
    }

    assert_eq!(tools.initialize_count(), 1);
    assert!(bridge.is_connected().await);
}

#[tokio::test]
async fn test_http_streamed_reply() {
    let tools = common::ToolServer::streaming(json!({
        "structuredContent": { "result": { "is_anomaly": false, "anomaly_score": 0.1 } }
    }));
    let bridge = common::bridge(Some(tools.start().await));

    let result = bridge.invoke("check_fraud_risk", json!({ "user_id": "u-1" })).await.unwrap();
    assert_eq!(result.data, Some(json!({ "is_anomaly": false, "anomaly_score": 0.1 })));
    assert_eq!(tools.recorded_calls().len(), 1);
}

use super::endpoint::AgentEndpoint;
use super::{via_tool_bridge, Dispatched, Tier};
use crate::error::Result;
use crate::services::tool_bridge::ToolBridge;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const CHECK_FRAUD_RISK_TOOL: &str = "check_fraud_risk";

#[derive(Debug, Clone)]
pub struct SecurityDispatcher {
    endpoint: AgentEndpoint,
    bridge: Arc<ToolBridge>,
    timeout: Duration,
}

impl SecurityDispatcher {
    pub fn new(endpoint: AgentEndpoint, bridge: Arc<ToolBridge>, timeout: Duration) -> Self {
        Self {
            endpoint,
            bridge,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    pub async fn analyze_user(&self, user_id: &str) -> Result<Dispatched> {
        let failure = match self
            .endpoint
            .post_json(&["detect-anomaly", user_id], &json!({}), self.timeout)
            .await
        {
            Ok(response) => return Ok(Dispatched::new(Tier::Primary, response)),
            Err(e) => e,
        };

        if !self.bridge.is_configured() {
            return Err(failure);
        }
        warn!(
            agent = self.endpoint.name(),
            user_id,
            error = %failure,
            "primary call failed, using tool bridge"
        );

        let arguments = json!({ "user_id": user_id });
        let response = via_tool_bridge(&self.bridge, CHECK_FRAUD_RISK_TOOL, arguments).await?;
        Ok(Dispatched::new(Tier::ToolBridge, response))
    }
}

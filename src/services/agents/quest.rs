use super::endpoint::AgentEndpoint;
use super::types::QuestProfile;
use super::{via_tool_bridge, Dispatched, Tier};
use crate::error::Result;
use crate::services::tool_bridge::ToolBridge;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const GENERATE_QUEST_TOOL: &str = "generate_quest";

#[derive(Debug, Clone)]
pub struct QuestDispatcher {
    endpoint: AgentEndpoint,
    bridge: Arc<ToolBridge>,
    timeout: Duration,
}

impl QuestDispatcher {
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

    /// Quest service first, then the `generate_quest` tool.
    pub async fn generate_quest(&self, profile: &QuestProfile) -> Result<Dispatched> {
        let failure = match self
            .endpoint
            .post_json(&["generate-quest"], profile, self.timeout)
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
            error = %failure,
            "primary call failed, using tool bridge"
        );

        let arguments = json!({ "user_profile": profile });
        let response = via_tool_bridge(&self.bridge, GENERATE_QUEST_TOOL, arguments).await?;
        Ok(Dispatched::new(Tier::ToolBridge, response))
    }
}

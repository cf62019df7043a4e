//! Dispatchers for the three capability services.
//!
//! Each dispatcher makes one primary attempt (no retry) and, on any failure,
//! moves down its tiers in order. A failure on the last available tier is
//! returned to the caller as-is.

pub mod economy;
pub mod endpoint;
pub mod quest;
pub mod security;
pub mod types;

pub use economy::EconomyDispatcher;
pub use endpoint::AgentEndpoint;
pub use quest::QuestDispatcher;
pub use security::SecurityDispatcher;
pub use types::{QuestProfile, SimulationRequest, UserIdentity};

use super::tool_bridge::ToolBridge;
use super::CapabilityResponse;
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;

/// Which tier produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Primary,
    ToolBridge,
    LocalApproximation,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Primary => "primary",
            Tier::ToolBridge => "tool_bridge",
            Tier::LocalApproximation => "local_approximation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub tier: Tier,
    pub response: CapabilityResponse,
}

impl Dispatched {
    pub fn new(tier: Tier, response: CapabilityResponse) -> Self {
        Self { tier, response }
    }
}

/// Secondary tier shared by all dispatchers.
pub(crate) async fn via_tool_bridge(
    bridge: &ToolBridge,
    tool: &str,
    arguments: Value,
) -> Result<CapabilityResponse> {
    bridge.invoke(tool, arguments).await?.into_response(tool)
}

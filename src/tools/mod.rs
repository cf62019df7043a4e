//! The three capabilities exposed as named tools, so this process can serve
//! as a tool endpoint for other orchestrators.

pub mod server;

pub use server::{ToolServer, ToolServerConfig};

use crate::error::{OrchestratorError, Result};
use crate::logic;
use crate::services::agents::{
    EconomyDispatcher, QuestDispatcher, QuestProfile, SecurityDispatcher, SimulationRequest,
};
use crate::services::agents::economy::OPTIMIZE_ECONOMY_TOOL;
use crate::services::agents::quest::GENERATE_QUEST_TOOL;
use crate::services::agents::security::CHECK_FRAUD_RISK_TOOL;
use crate::services::CapabilityResponse;
use crate::telemetry::TelemetryBus;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub argument: &'static str,
}

const TOOLS: [ToolDescriptor; 3] = [
    ToolDescriptor {
        name: GENERATE_QUEST_TOOL,
        description: "Generate a personalized quest for a player profile",
        argument: "user_profile",
    },
    ToolDescriptor {
        name: OPTIMIZE_ECONOMY_TOOL,
        description: "Simulate token supply and decide on deflationary adjustment",
        argument: "simulation",
    },
    ToolDescriptor {
        name: CHECK_FRAUD_RISK_TOOL,
        description: "Score a user for anomalous or fraudulent behaviour",
        argument: "user_id",
    },
];

#[derive(Debug, Clone)]
pub struct ToolRouter {
    quests: QuestDispatcher,
    economy: EconomyDispatcher,
    security: SecurityDispatcher,
    telemetry: Arc<TelemetryBus>,
}

impl ToolDescriptor {
    /// JSON schema for the single required argument.
    pub fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { (self.argument): {} },
            "required": [self.argument],
        })
    }
}

impl ToolRouter {
    pub fn new(
        quests: QuestDispatcher,
        economy: EconomyDispatcher,
        security: SecurityDispatcher,
        telemetry: Arc<TelemetryBus>,
    ) -> Self {
        Self {
            quests,
            economy,
            security,
            telemetry,
        }
    }

    pub fn tools(&self) -> &'static [ToolDescriptor] {
        &TOOLS
    }

    pub async fn call(&self, name: &str, arguments: &Value) -> Result<CapabilityResponse> {
        debug!(tool = name, "routing tool call");
        match name {
            GENERATE_QUEST_TOOL => {
                let raw = argument(arguments, "user_profile")?;
                let profile: QuestProfile = serde_json::from_value(raw.clone())
                    .map_err(|e| OrchestratorError::InvalidInput(format!("user_profile: {}", e)))?;
                logic::generate_personalized_quest(&profile, &self.quests, &self.telemetry).await
            }
            OPTIMIZE_ECONOMY_TOOL => {
                let raw = argument(arguments, "simulation")?;
                let map = raw.as_object().ok_or_else(|| {
                    OrchestratorError::InvalidInput("simulation must be an object".to_string())
                })?;
                let request = SimulationRequest::from_loose(map);
                logic::run_economy_simulation(&request, &self.economy, &self.telemetry).await
            }
            CHECK_FRAUD_RISK_TOOL => {
                let user_id = argument(arguments, "user_id")?.as_str().ok_or_else(|| {
                    OrchestratorError::InvalidInput("user_id must be a string".to_string())
                })?;
                logic::analyze_user(user_id, &self.security, &self.telemetry).await
            }
            other => Err(OrchestratorError::UnknownTool(other.to_string())),
        }
    }
}

fn argument<'a>(arguments: &'a Value, key: &str) -> Result<&'a Value> {
    arguments
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| OrchestratorError::InvalidInput(format!("missing argument `{}`", key)))
}

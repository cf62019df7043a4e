use super::endpoint::AgentEndpoint;
use super::types::SimulationRequest;
use super::{via_tool_bridge, Dispatched, Tier};
use crate::error::Result;
use crate::logic::monte_carlo;
use crate::services::tool_bridge::ToolBridge;
use crate::services::CapabilityResponse;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const OPTIMIZE_ECONOMY_TOOL: &str = "optimize_economy";

/// Economy service, then the `optimize_economy` tool, then the local
/// Monte Carlo approximation. The last tier cannot fail.
#[derive(Debug, Clone)]
pub struct EconomyDispatcher {
    endpoint: AgentEndpoint,
    bridge: Arc<ToolBridge>,
    timeout: Duration,
    rate_timeout: Duration,
    seed: Option<u64>,
}

impl EconomyDispatcher {
    pub fn new(
        endpoint: AgentEndpoint,
        bridge: Arc<ToolBridge>,
        timeout: Duration,
        rate_timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            bridge,
            timeout,
            rate_timeout,
            seed: None,
        }
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    /// Seed the local approximation so degraded-mode output is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn run_simulation(&self, request: &SimulationRequest) -> Result<Dispatched> {
        match self
            .endpoint
            .post_json(&["run-simulation"], request, self.timeout)
            .await
        {
            Ok(response) => return Ok(Dispatched::new(Tier::Primary, response)),
            Err(e) => warn!(agent = self.endpoint.name(), error = %e, "primary call failed"),
        }

        if self.bridge.is_configured() {
            let arguments = json!({ "simulation": request });
            match via_tool_bridge(&self.bridge, OPTIMIZE_ECONOMY_TOOL, arguments).await {
                Ok(response) => return Ok(Dispatched::new(Tier::ToolBridge, response)),
                Err(e) => warn!(agent = self.endpoint.name(), error = %e, "tool bridge failed"),
            }
        }

        warn!(
            agent = self.endpoint.name(),
            iterations = request.iterations,
            days = request.days,
            "falling back to local approximation"
        );
        Ok(Dispatched::new(Tier::LocalApproximation, self.approximate(request)))
    }

    /// Current emission rate. Primary only; failures propagate.
    pub async fn current_emission_rate(&self) -> Result<CapabilityResponse> {
        self.endpoint
            .get_json(&["get-current-emission-rate"], self.rate_timeout)
            .await
    }

    fn approximate(&self, request: &SimulationRequest) -> CapabilityResponse {
        let estimate = match self.seed {
            Some(seed) => monte_carlo::approximate(request, &mut StdRng::seed_from_u64(seed)),
            None => monte_carlo::approximate(request, &mut rand::rng()),
        };
        estimate.into_response()
    }
}

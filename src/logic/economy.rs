use super::into_payload;
use crate::error::Result;
use crate::services::agents::{EconomyDispatcher, SimulationRequest};
use crate::services::CapabilityResponse;
use crate::telemetry::TelemetryBus;
use serde_json::{json, Value};
use tracing::info;

pub const ECONOMY_SIMULATION: &str = "economy.simulation";

pub async fn run_economy_simulation(
    request: &SimulationRequest,
    economy: &EconomyDispatcher,
    telemetry: &TelemetryBus,
) -> Result<CapabilityResponse> {
    request.validate()?;
    let dispatched = economy.run_simulation(request).await?;
    let result = dispatched.response;

    let predicted_inflation = result
        .get("simulation_result")
        .and_then(|sim| sim.get("predicted_inflation"))
        .cloned()
        .unwrap_or(Value::Null);
    let trigger = result
        .get("adjustment_decision")
        .and_then(|d| d.get("trigger_deflationary_protocol"))
        .cloned()
        .unwrap_or(Value::Null);

    info!(source = dispatched.tier.as_str(), %predicted_inflation, "economy simulation complete");
    telemetry.emit(
        ECONOMY_SIMULATION,
        into_payload(json!({
            "predicted_inflation": predicted_inflation,
            "trigger_deflation": trigger,
            "source": dispatched.tier.as_str(),
        })),
    );

    Ok(result)
}

use super::into_payload;
use crate::error::{OrchestratorError, Result};
use crate::services::agents::SecurityDispatcher;
use crate::services::CapabilityResponse;
use crate::telemetry::TelemetryBus;
use serde_json::{json, Value};
use tracing::info;

pub const SECURITY_ALERT: &str = "security.alert";

pub async fn analyze_user(
    user_id: &str,
    security: &SecurityDispatcher,
    telemetry: &TelemetryBus,
) -> Result<CapabilityResponse> {
    // Blank ids are rejected; anything else goes to the agent as given.
    if user_id.trim().is_empty() {
        return Err(OrchestratorError::InvalidInput("user_id must not be empty".to_string()));
    }

    let dispatched = security.analyze_user(user_id).await?;
    let result = dispatched.response;
    let field = |key: &str| result.get(key).cloned().unwrap_or(Value::Null);

    info!(
        user_id,
        source = dispatched.tier.as_str(),
        is_anomaly = %field("is_anomaly"),
        "security analysis complete"
    );
    telemetry.emit(
        SECURITY_ALERT,
        into_payload(json!({
            "user_id": user_id,
            "is_anomaly": field("is_anomaly"),
            "anomaly_score": field("anomaly_score"),
            "action_taken": field("action_taken"),
            "source": dispatched.tier.as_str(),
        })),
    );

    Ok(result)
}

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
    #[serde(default)]
    pub xp_balance: i64,
    #[serde(default)]
    pub reputation_score: f64,
    /// Anything else the client sent; forwarded untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input to quest generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProfile {
    pub user_identity: UserIdentity,
    #[serde(default)]
    pub recent_events: Vec<Value>,
    #[serde(default)]
    pub total_quests_completed: u32,
    #[serde(default)]
    pub average_completion_time: f64,
}

impl QuestProfile {
    pub fn validate(&self) -> Result<()> {
        if !self.user_identity.reputation_score.is_finite() {
            return Err(OrchestratorError::InvalidInput(
                "reputation_score must be a finite number".to_string(),
            ));
        }
        if self.average_completion_time < 0.0 {
            return Err(OrchestratorError::InvalidInput(
                "average_completion_time must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

const DEFAULT_DAYS: u32 = 30;
const DEFAULT_ITERATIONS: u32 = 1000;

fn default_days() -> u32 {
    DEFAULT_DAYS
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

/// Input to the economy simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub current_supply: f64,
    pub adoption_rate: f64,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl Default for SimulationRequest {
    /// Baseline scenario the local approximator assumes for missing fields.
    fn default() -> Self {
        Self {
            current_supply: 1_000_000.0,
            adoption_rate: 5.0,
            days: DEFAULT_DAYS,
            iterations: 500,
        }
    }
}

impl SimulationRequest {
    /// Lenient read of a free-form map; absent or mistyped fields take
    /// [`SimulationRequest::default`] values.
    pub fn from_loose(map: &Map<String, Value>) -> Self {
        let base = Self::default();
        let number = |key: &str| map.get(key).and_then(Value::as_f64);
        Self {
            current_supply: number("current_supply").unwrap_or(base.current_supply),
            adoption_rate: number("adoption_rate").unwrap_or(base.adoption_rate),
            days: number("days").map(|d| d.max(0.0) as u32).unwrap_or(base.days),
            iterations: number("iterations").map(|i| i.max(0.0) as u32).unwrap_or(base.iterations),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(OrchestratorError::InvalidInput(msg.to_string()));
        if !(self.current_supply.is_finite() && self.current_supply > 0.0) {
            return invalid("current_supply must be greater than 0");
        }
        if !(0.0..=100.0).contains(&self.adoption_rate) {
            return invalid("adoption_rate must be between 0 and 100");
        }
        if !(1..=365).contains(&self.days) {
            return invalid("days must be between 1 and 365");
        }
        if !(100..=10_000).contains(&self.iterations) {
            return invalid("iterations must be between 100 and 10000");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simulation_defaults_on_deserialize() {
        let raw = json!({"current_supply": 500000, "adoption_rate": 2.5});
        let req: SimulationRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.days, 30);
        assert_eq!(req.iterations, 1000);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_simulation_bounds() {
        let ok = SimulationRequest::default();
        assert!(ok.validate().is_ok());

        for bad in [
            SimulationRequest { current_supply: 0.0, ..ok },
            SimulationRequest { adoption_rate: 100.5, ..ok },
            SimulationRequest { adoption_rate: -1.0, ..ok },
            SimulationRequest { days: 0, ..ok },
            SimulationRequest { days: 366, ..ok },
            SimulationRequest { iterations: 99, ..ok },
            SimulationRequest { iterations: 10_001, ..ok },
        ] {
            assert!(matches!(bad.validate(), Err(OrchestratorError::InvalidInput(_))), "{bad:?}");
        }
    }

    #[test]
    fn test_from_loose_fills_missing_fields() {
        let map = json!({"adoption_rate": 7.5, "days": "soon"});
        let req = SimulationRequest::from_loose(map.as_object().unwrap());
        assert_eq!(req.current_supply, 1_000_000.0);
        assert_eq!(req.adoption_rate, 7.5);
        assert_eq!(req.days, 30);
        assert_eq!(req.iterations, 500);
    }

    #[test]
    fn test_profile_keeps_unknown_identity_fields() {
        let profile: QuestProfile = serde_json::from_value(json!({
            "user_identity": {
                "wallet_id": "0xA",
                "xp_balance": 900,
                "reputation_score": 41.5,
                "tier": "gold"
            },
        }))
        .unwrap();
        assert_eq!(profile.user_identity.extra["tier"], "gold");
        assert_eq!(profile.total_quests_completed, 0);

        let wire = serde_json::to_value(&profile).unwrap();
        assert_eq!(wire["user_identity"]["tier"], "gold");
        assert_eq!(wire["user_identity"]["xp_balance"], 900);
    }
}

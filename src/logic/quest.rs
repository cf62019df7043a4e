use super::into_payload;
use crate::error::Result;
use crate::services::agents::{QuestDispatcher, QuestProfile};
use crate::services::CapabilityResponse;
use crate::telemetry::TelemetryBus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub const QUEST_GENERATED: &str = "quest.generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cohort {
    Rookie,
    Core,
    Elite,
}

impl Cohort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::Rookie => "rookie",
            Cohort::Core => "core",
            Cohort::Elite => "elite",
        }
    }
}

/// Low reputation or a thin XP balance keeps a player a rookie; past that,
/// reputation alone separates core from elite.
pub fn classify_cohort(reputation_score: f64, xp_balance: i64) -> Cohort {
    if reputation_score < 20.0 || xp_balance < 250 {
        Cohort::Rookie
    } else if reputation_score < 60.0 {
        Cohort::Core
    } else {
        Cohort::Elite
    }
}

pub async fn generate_personalized_quest(
    profile: &QuestProfile,
    quests: &QuestDispatcher,
    telemetry: &TelemetryBus,
) -> Result<CapabilityResponse> {
    profile.validate()?;
    let identity = &profile.user_identity;
    let cohort = classify_cohort(identity.reputation_score, identity.xp_balance);

    let dispatched = quests.generate_quest(profile).await?;
    let mut quest = dispatched.response;
    quest.insert("cohort".to_string(), json!(cohort.as_str()));

    info!(cohort = cohort.as_str(), source = dispatched.tier.as_str(), "quest generated");
    telemetry.emit(
        QUEST_GENERATED,
        into_payload(json!({
            "cohort": cohort.as_str(),
            "wallet_id": identity.wallet_id,
            "quest_id": quest.get("quest_id").cloned().unwrap_or(Value::Null),
            "difficulty": quest.get("difficulty_rating").cloned().unwrap_or(Value::Null),
            "source": dispatched.tier.as_str(),
        })),
    );

    Ok(quest)
}

//! Orchestration on top of the dispatchers: input checks, domain
//! post-processing and one telemetry event per successful call.

pub mod economy;
pub mod monte_carlo;
pub mod quest;
pub mod security;

pub use economy::run_economy_simulation;
pub use quest::{classify_cohort, generate_personalized_quest, Cohort};
pub use security::analyze_user;

use serde_json::{Map, Value};

pub(crate) fn into_payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

//! Local statistical stand-in for the economy service.
//!
//! Only used once both remote tiers are exhausted. The numbers are a best
//! local estimate, never the source of truth.

use crate::services::agents::SimulationRequest;
use crate::services::CapabilityResponse;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use serde_json::json;

/// Mean inflation (percent) above which deflationary measures are triggered.
pub const DEFLATION_THRESHOLD_PCT: f64 = 5.0;

const DAILY_EMISSION_RATE: f64 = 0.001;
const GROWTH_SPREAD: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulationEstimate {
    pub predicted_inflation: f64,
    pub inflation_std: f64,
    pub mean_final_supply: f64,
    pub trigger_deflationary_protocol: bool,
}

impl SimulationEstimate {
    /// Same shape the economy service returns.
    pub fn into_response(self) -> CapabilityResponse {
        let value = json!({
            "simulation_result": {
                "predicted_inflation": self.predicted_inflation,
                "inflation_std": self.inflation_std,
                "mean_final_supply": self.mean_final_supply,
            },
            "adjustment_decision": {
                "trigger_deflationary_protocol": self.trigger_deflationary_protocol,
            },
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => CapabilityResponse::new(),
        }
    }
}

/// Run `iterations` independent supply trajectories over `days` daily steps.
///
/// Daily growth is drawn from N(adoption_rate, 0.25 * adoption_rate) and
/// floored at zero; the day's emission is `supply * 0.001 * (1 + growth/100)`.
pub fn approximate<R: Rng + ?Sized>(
    request: &SimulationRequest,
    rng: &mut R,
) -> SimulationEstimate {
    let iterations = request.iterations.max(1) as usize;
    let start = request.current_supply;
    let spread = (request.adoption_rate * GROWTH_SPREAD).abs();
    let growth = Normal::new(request.adoption_rate, spread).ok();

    let mut inflations = Vec::with_capacity(iterations);
    let mut finals = Vec::with_capacity(iterations);

    for _ in 0..iterations {
        let mut supply = start;
        for _ in 0..request.days {
            let g = growth
                .as_ref()
                .map(|dist| dist.sample(rng))
                .unwrap_or(request.adoption_rate)
                .max(0.0);
            supply += supply * DAILY_EMISSION_RATE * (1.0 + g / 100.0);
        }
        finals.push(supply);
        inflations.push((supply - start) / start * 100.0);
    }

    let predicted_inflation = mean(&inflations);
    SimulationEstimate {
        predicted_inflation,
        inflation_std: population_std(&inflations, predicted_inflation),
        mean_final_supply: mean(&finals),
        trigger_deflationary_protocol: predicted_inflation > DEFLATION_THRESHOLD_PCT,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

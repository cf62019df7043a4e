use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One logical telemetry event. Built fresh on every emit and never mutated.
///
/// The wire form keeps the short `event` key so instances on older builds
/// still decode each other's envelopes from the shared channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    #[serde(rename = "event")]
    pub event_type: String,
    pub origin: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl TelemetryEnvelope {
    pub fn new(
        event_type: impl Into<String>,
        origin: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            origin: origin.into(),
            payload,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    /// `(event name, data)` pair for a push-stream frame.
    pub fn sse_frame(&self) -> (String, String) {
        let name = if self.event_type.is_empty() {
            "message".to_string()
        } else {
            self.event_type.clone()
        };
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        (name, data)
    }
}

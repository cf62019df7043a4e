pub mod agents;
pub mod tool_bridge;

/// Free-form response map returned by every capability.
pub type CapabilityResponse = serde_json::Map<String, serde_json::Value>;

pub use agents::{Dispatched, EconomyDispatcher, QuestDispatcher, SecurityDispatcher, Tier};
pub use tool_bridge::{HttpToolTransport, ToolBridge, ToolResult, ToolSession, ToolTransport};

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod logic;
pub mod services;
pub mod telemetry;
pub mod tools;

// Re-export the entry points most callers need
pub use config::Settings;
pub use context::{AppContext, ContextParts};
pub use error::{OrchestratorError, Result};
pub use services::{Dispatched, Tier};
pub use tools::ToolRouter;

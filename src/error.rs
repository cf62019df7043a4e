use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Failure kinds surfaced by dispatchers, the tool bridge and the telemetry path.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Network error, timeout or non-success status from a remote endpoint.
    #[error("transport failure talking to {target}: {message}")]
    Transport { target: String, message: String },

    /// A channel was used without the endpoint it needs.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed response from {target}: {message}")]
    MalformedResponse { target: String, message: String },

    /// The tool-call endpoint answered, but with an error result or a
    /// JSON-RPC error. The session itself is still usable.
    #[error("{target} reported an error: {message}")]
    ToolFailure { target: String, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl OrchestratorError {
    pub fn transport(target: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(target: impl Into<String>, message: impl ToString) -> Self {
        Self::MalformedResponse {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn tool_failure(target: impl Into<String>, message: impl ToString) -> Self {
        Self::ToolFailure {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(e: reqwest::Error) -> Self {
        let target = e
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "http".to_string());
        if e.is_decode() {
            Self::malformed(target, e)
        } else {
            Self::transport(target, e)
        }
    }
}

impl From<redis::RedisError> for OrchestratorError {
    fn from(e: redis::RedisError) -> Self {
        Self::transport("redis", e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed("json", e)
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(e: config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_are_malformed() {
        let err: OrchestratorError = serde_json::from_str::<serde_json::Value>("{nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, OrchestratorError::MalformedResponse { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_tool_failure_is_not_transport() {
        let err = OrchestratorError::tool_failure("check_fraud_risk", "rate limited");
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "check_fraud_risk reported an error: rate limited");
    }

    #[test]
    fn test_transport_display_names_target() {
        let err = OrchestratorError::transport("quest-agent", "connection refused");
        assert_eq!(
            err.to_string(),
            "transport failure talking to quest-agent: connection refused"
        );
    }
}

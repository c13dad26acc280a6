//! Error types for the routing engine

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AgentsError>;

/// Main error type for the routing engine.
///
/// Tool failures are not represented here; they are values handed back to the
/// acting agent (see [`ToolFailure`](crate::tool::ToolFailure)), not errors
/// that unwind the turn.
#[derive(Debug, Error)]
pub enum AgentsError {
    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    /// An input guardrail rejected the latest user message
    #[error("Input guardrail triggered: {guardrail}: {reasoning}")]
    GuardrailTripwire { guardrail: String, reasoning: String },

    /// The requested handoff target is not reachable from the active agent
    #[error("Unreachable handoff: {from} cannot hand off to {to}")]
    UnreachableHandoff { from: String, to: String },

    /// The agent kept calling tools without producing a reply or a handoff
    #[error("Iteration cap exceeded: {max_turns}")]
    IterationCapExceeded { max_turns: usize },

    /// A model call failed for a reason other than a timeout
    #[error("Model call failed: {message}")]
    ModelCall { message: String },

    /// An external call did not finish in time
    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// The model answered with something the engine cannot act on
    #[error("Model behavior error: {message}")]
    ModelBehavior { message: String },

    /// The session was torn down while the turn was running
    #[error("Session closed")]
    Cancelled,

    /// Registry or engine configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl AgentsError {
    /// Builds a [`AgentsError::Timeout`] from the operation name and its deadline.
    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms: after.as_millis() as u64,
        }
    }
}

/// Structural problems detected while building a registry or loading
/// configuration. These are meant to fail before any traffic is served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("registry has no agents")]
    EmptyRegistry,

    #[error("agent '{0}' is registered more than once")]
    DuplicateAgent(String),

    #[error("{referenced_by} references unknown agent '{name}'")]
    UnknownAgent { referenced_by: String, name: String },

    #[error("handoff {from} -> {to} is declared more than once")]
    DuplicateHandoff { from: String, to: String },

    #[error("agent '{agent}' exposes tool name '{tool}' more than once")]
    ToolNameCollision { agent: String, tool: String },

    #[error("invalid value for {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("cannot load config from {path}: {message}")]
    File { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = AgentsError::IterationCapExceeded { max_turns: 10 };
        assert_eq!(err.to_string(), "Iteration cap exceeded: 10");

        let err = AgentsError::GuardrailTripwire {
            guardrail: "Jailbreak Guardrail".to_string(),
            reasoning: "asks for the system prompt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Input guardrail triggered: Jailbreak Guardrail: asks for the system prompt"
        );
    }

    #[test]
    fn test_timeout_helper() {
        let err = AgentsError::timeout("model call", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "model call timed out after 1500 ms");
    }

    #[test]
    fn test_error_from_openai() {
        let openai_err = async_openai::error::OpenAIError::InvalidArgument("test".to_string());
        let agents_err: AgentsError = openai_err.into();
        assert!(matches!(agents_err, AgentsError::OpenAIError(_)));
    }

    #[test]
    fn test_config_error_wraps() {
        let err: AgentsError = ConfigError::DuplicateAgent("Triage".to_string()).into();
        assert!(matches!(err, AgentsError::Config(ConfigError::DuplicateAgent(_))));
        assert_eq!(
            err.to_string(),
            "Configuration error: agent 'Triage' is registered more than once"
        );
    }
}

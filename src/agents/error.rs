//! Error types for the agent system

use serde::Serialize;
use thiserror::Error;

/// Wire-level error codes exposed in the HTTP error envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AgentNotFound,
    AgentConfigError,
    McpConnectionError,
    AgentExecutionError,
    ValidationError,
    A2aTaskError,
    InternalError,
}

/// Errors that can occur during agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    /// No agent registered under the requested path
    #[error("Agent not found: {0}")]
    NotFound(String),

    /// An agent config file failed to parse or validate
    #[error("Invalid agent config {file}: {reason}")]
    Config { file: String, reason: String },

    /// Request-level validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// A tool source could not be reached
    #[error("Tool source connection failed: {0}")]
    McpConnection(String),

    /// A tool invocation failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Provider or transport failure while executing a turn
    #[error("Agent '{agent}' execution failed: {source}")]
    Execution {
        agent: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Cooperative cancellation observed mid-turn
    #[error("Operation was cancelled")]
    Cancelled,

    /// No task registered under the requested id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Task state machine violation or stream failure
    #[error("Task error: {0}")]
    Task(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Wrap a provider/transport failure with the owning agent id.
    pub fn execution(
        agent: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AgentError::Execution {
            agent: agent.into(),
            source: source.into(),
        }
    }

    /// The wire code this error maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            AgentError::NotFound(_) => ErrorCode::AgentNotFound,
            AgentError::Config { .. } => ErrorCode::AgentConfigError,
            AgentError::Validation(_) => ErrorCode::ValidationError,
            AgentError::McpConnection(_) => ErrorCode::McpConnectionError,
            AgentError::ToolExecution(_)
            | AgentError::Execution { .. }
            | AgentError::Cancelled => ErrorCode::AgentExecutionError,
            AgentError::TaskNotFound(_) | AgentError::Task(_) => ErrorCode::A2aTaskError,
            AgentError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Internal(format!("serialization error: {}", err))
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::Internal(format!("IO error: {}", err))
    }
}

/// Errors specific to LLM provider operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::A2aTaskError).unwrap();
        assert_eq!(json, "\"A2A_TASK_ERROR\"");
        let json = serde_json::to_string(&ErrorCode::McpConnectionError).unwrap();
        assert_eq!(json, "\"MCP_CONNECTION_ERROR\"");
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(
            AgentError::NotFound("sales".into()).code(),
            ErrorCode::AgentNotFound
        );
        assert_eq!(
            AgentError::execution("sales", LlmError::Timeout).code(),
            ErrorCode::AgentExecutionError
        );
        assert_eq!(
            AgentError::TaskNotFound("t1".into()).code(),
            ErrorCode::A2aTaskError
        );
    }
}

//! Error types for failure handling across the agent
//!
//! This module provides a unified error hierarchy for every failure mode the
//! agent can hit. Errors are grouped by where they originate (client input,
//! the tool registry, the language model, the orchestration loop and the
//! persistence collaborators) so the layers above can decide whether to
//! contain a failure, degrade gracefully or report it to the caller.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    ArgumentValidation { tool_name: String, message: String },
    #[error("Tool execution failed for '{tool_name}': {message}")]
    ToolError { tool_name: String, message: String },
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Model response invalid: {0}")]
    ModelResponseInvalid(String),
    #[error("Orchestration failed: {0}")]
    Orchestration(String),
    #[error("Invocation cancelled")]
    Cancelled,
    #[error("Conversation history error: {0}")]
    History(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Mail delivery failed: {0}")]
    Mail(String),
    #[error("RAG operation failed: {0}")]
    RagError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AgentError {
    /// Errors caused by the caller's input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AgentError::InvalidRequest(_))
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::ModelUnavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Storage(format!("serialization failed: {}", err))
    }
}

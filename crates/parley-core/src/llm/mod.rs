//! Language model provider abstractions and integrations.
//!
//! Defines the `LLM` trait the reasoning step talks to, the tool descriptor
//! shape presented to models, and provider clients for OpenAI-compatible
//! endpoints and Google Gemini.

pub use crate::core_types::{LLMResponse, Message};
use crate::errors::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod providers;

pub use providers::{create_llm_client, GeminiClient, OpenAIClient};

/// What the model sees of a tool: its name, purpose and JSON argument schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait LLM: Send + Sync {
    /// Produce the next assistant turn for `messages`.
    ///
    /// Implementations return `ModelUnavailable` when the provider cannot be
    /// reached or answers with an error status, and `ModelResponseInvalid`
    /// when the answer cannot be decoded into content or tool calls.
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError>;
}

use std::collections::HashSet;
use std::sync::Arc;

use crate::core_types::{generate_call_id, LLMResponse, Message};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};

pub const DEGRADED_REPLY: &str = "I'm sorry, I wasn't able to process your request right now. \
Please try again in a moment.";

/// Result of one reasoning step. A failed model call still yields a valid
/// assistant message, with the error kept alongside for logging.
#[derive(Debug, Clone)]
pub enum ReasoningOutcome {
    Reply(Message),
    Degraded { message: Message, error: AgentError },
}

impl ReasoningOutcome {
    pub fn message(&self) -> &Message {
        match self {
            ReasoningOutcome::Reply(message) => message,
            ReasoningOutcome::Degraded { message, .. } => message,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            ReasoningOutcome::Reply(message) => message,
            ReasoningOutcome::Degraded { message, .. } => message,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ReasoningOutcome::Degraded { .. })
    }
}

pub struct ReasoningStep {
    llm: Arc<dyn LLM>,
}

impl ReasoningStep {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self { llm }
    }

    /// Ask the model for the next assistant turn. Never executes a tool and
    /// never touches `messages`.
    pub async fn run(&self, messages: &[Message], tools: &[ToolMetadata]) -> ReasoningOutcome {
        let tools = if tools.is_empty() {
            None
        } else {
            Some(tools.to_vec())
        };

        let result = self
            .llm
            .generate(messages.to_vec(), tools)
            .await
            .and_then(into_assistant_message);

        match result {
            Ok(message) => {
                if message.has_tool_calls() {
                    let names: Vec<&str> = message.pending_calls().iter().map(|c| c.name.as_str()).collect();
                    log::info!("Model requested {} tool call(s): {:?}", names.len(), names);
                } else {
                    log::info!("Model produced a final answer");
                }
                ReasoningOutcome::Reply(message)
            }
            Err(error) => {
                log::warn!("Reasoning step degraded: {}", error);
                ReasoningOutcome::Degraded {
                    message: Message::assistant(DEGRADED_REPLY),
                    error,
                }
            }
        }
    }
}

fn into_assistant_message(response: LLMResponse) -> Result<Message, AgentError> {
    let content = response.content.unwrap_or_default();
    let mut calls = response.tool_calls.unwrap_or_default();

    if calls.is_empty() && content.trim().is_empty() {
        return Err(AgentError::ModelResponseInvalid(
            "response has neither content nor tool calls".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for call in calls.iter_mut() {
        if call.name.trim().is_empty() {
            return Err(AgentError::ModelResponseInvalid(
                "tool call without a tool name".to_string(),
            ));
        }
        if call.id.is_empty() {
            call.id = generate_call_id();
        }
        if !seen.insert(call.id.clone()) {
            return Err(AgentError::ModelResponseInvalid(format!(
                "duplicate tool call id '{}'",
                call.id
            )));
        }
    }

    Ok(Message::assistant_with_calls(content, calls))
}

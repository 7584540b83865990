//! Agent orchestration: the reasoning / tool-execution loop
//!
//! A loop run alternates between asking the language model for the next
//! assistant turn and executing the tool calls that turn requested, until the
//! model answers without requesting tools or the cycle guard trips. Failures
//! inside either step are contained and turned into messages, so a run
//! always ends with a textual answer unless the loop's own bookkeeping breaks.

pub mod executor;
pub mod orchestrator;
pub mod reasoning;

use std::time::Duration;

use crate::config::AgentSettings;

pub use executor::{ToolCallResult, ToolExecutor};
pub use orchestrator::{LoopRun, LoopState, Orchestrator, Termination};
pub use reasoning::{ReasoningOutcome, ReasoningStep, DEGRADED_REPLY};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for an organization's candidates and staff. \
Answer questions using the ingested documents: call the `document_retriever` tool to look up \
information before answering, and base your answer only on what it returns. If the documents do \
not contain the answer, say that you don't know instead of guessing. When someone wants to book an \
interview, collect their full name, email address, preferred date and preferred time, then call \
the `book_interview` tool once with those four values and report the outcome it returns. Never \
invent policies, bookings or confirmations.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_cycles: usize,
    pub system_prompt: String,
    pub history_window: Option<usize>,
    pub tool_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_window: None,
            tool_timeout: None,
        }
    }
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_cycles: settings.max_cycles,
            system_prompt: settings
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            history_window: settings.history_window,
            tool_timeout: settings.tool_timeout_secs.map(Duration::from_secs),
        }
    }
}

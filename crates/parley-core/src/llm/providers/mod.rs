//! LLM provider implementations

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::AgentError;
use crate::llm::LLM;
use std::sync::Arc;

/// Build the LLM client selected by the configuration.
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    validate_provider_config(config)?;

    match &config.provider {
        LlmProvider::OpenAI => openai::create_client(config, None),
        LlmProvider::Custom { base_url } => openai::create_client(config, Some(base_url)),
        LlmProvider::Gemini => gemini::create_client(config),
    }
}

fn validate_provider_config(config: &LlmConfig) -> Result<(), AgentError> {
    if config.model.is_empty() {
        return Err(AgentError::ConfigError("LLM model cannot be empty".to_string()));
    }

    if let LlmProvider::Custom { base_url } = &config.provider {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AgentError::ConfigError(format!(
                "Custom provider base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }
    }

    Ok(())
}

//! Configuration type definitions for the agent
//!
//! This module provides the complete type system for configuring a Parley
//! deployment: the orchestration loop, the language model, the retrieval
//! pipeline, persistence, outbound mail and the HTTP surface. Every section
//! has sensible defaults so a minimal YAML file only needs to name the model.

use crate::errors::AgentError;
use crate::rag::EmbeddingModel;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Upper bound on reasoning/tool-execution round-trips per invocation.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Number of most recent history messages handed to the model.
    #[serde(default)]
    pub history_window: Option<usize>,
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_cycles: default_max_cycles(),
            system_prompt: None,
            history_window: None,
            tool_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub auth: LlmAuth,
}

/// LLM provider types
///
/// Written as a bare name (`provider: "gemini"`) or, for providers that take
/// settings, as a map keyed by `type`
/// (`provider: {type: custom, base_url: "http://localhost:11434/v1"}`).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    /// Any endpoint speaking the OpenAI chat completions protocol.
    Custom { base_url: String },
}

impl<'de> Deserialize<'de> for LlmProvider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(tag = "type", rename_all = "lowercase")]
        enum Tagged {
            OpenAI,
            Gemini,
            Custom { base_url: String },
        }

        match NameOrTagged::<Tagged>::deserialize(deserializer)? {
            NameOrTagged::Name(name) => match name.to_lowercase().as_str() {
                "openai" => Ok(LlmProvider::OpenAI),
                "gemini" => Ok(LlmProvider::Gemini),
                "custom" => Err(de::Error::custom(
                    "the custom provider needs a base_url: {type: custom, base_url: ...}",
                )),
                other => Err(de::Error::unknown_variant(other, &["openai", "gemini", "custom"])),
            },
            NameOrTagged::Tagged(Tagged::OpenAI) => Ok(LlmProvider::OpenAI),
            NameOrTagged::Tagged(Tagged::Gemini) => Ok(LlmProvider::Gemini),
            NameOrTagged::Tagged(Tagged::Custom { base_url }) => Ok(LlmProvider::Custom { base_url }),
        }
    }
}

/// A variant given either by name alone or as a map with a `type` key.
#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrTagged<T> {
    Name(String),
    Tagged(T),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmAuth {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    /// Base name of the vector collections. Each embedding model gets its
    /// own collection suffixed with the model selector.
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Embedding model used to embed queries for `document_retriever`.
    #[serde(default)]
    pub retrieval_model: EmbeddingModel,
    #[serde(default)]
    pub text_processing: TextProcessingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            top_k: default_top_k(),
            retrieval_model: EmbeddingModel::default(),
            text_processing: TextProcessingConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            vector_store: VectorStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextProcessingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_breakpoint_percentile")]
    pub semantic_breakpoint_percentile: f32,
    #[serde(default = "default_buffer_size")]
    pub semantic_buffer_size: usize,
}

impl Default for TextProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            semantic_breakpoint_percentile: default_breakpoint_percentile(),
            semantic_buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_google_endpoint")]
    pub google: EmbeddingEndpoint,
    #[serde(default = "default_bge_endpoint")]
    pub bge: EmbeddingEndpoint,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            google: default_google_endpoint(),
            bge: default_bge_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingEndpoint {
    pub api_base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VectorStoreConfig {
    /// JSON file backing the vector store. In-memory only when absent.
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Outbound mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub transport: MailTransport,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    /// Optional organizer copy of every confirmation.
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::default(),
            sender: default_sender(),
            organization: default_organization(),
            bcc: None,
            api_key: None,
            api_key_env: None,
            timeout_seconds: default_request_timeout(),
        }
    }
}

/// Written as `transport: "log"` or
/// `transport: {type: http, endpoint: "https://relay.example.com/send"}`.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MailTransport {
    /// Write confirmations to the log instead of delivering them.
    #[default]
    Log,
    /// POST confirmations to an HTTP mail relay.
    Http { endpoint: String },
}

impl<'de> Deserialize<'de> for MailTransport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(tag = "type", rename_all = "lowercase")]
        enum Tagged {
            Log,
            Http { endpoint: String },
        }

        match NameOrTagged::<Tagged>::deserialize(deserializer)? {
            NameOrTagged::Name(name) => match name.to_lowercase().as_str() {
                "log" => Ok(MailTransport::Log),
                "http" => Err(de::Error::custom(
                    "the http transport needs an endpoint: {type: http, endpoint: ...}",
                )),
                other => Err(de::Error::unknown_variant(other, &["log", "http"])),
            },
            NameOrTagged::Tagged(Tagged::Log) => Ok(MailTransport::Log),
            NameOrTagged::Tagged(Tagged::Http { endpoint }) => Ok(MailTransport::Http { endpoint }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub env_files: Vec<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String { "parley".to_string() }
fn default_max_cycles() -> usize { 10 }
fn default_temperature() -> f32 { 0.0 }
fn default_max_tokens() -> u32 { 4096 }
fn default_top_p() -> f32 { 1.0 }
fn default_request_timeout() -> u64 { 60 }
fn default_collection() -> String { "documents".to_string() }
fn default_top_k() -> usize { 3 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_breakpoint_percentile() -> f32 { 95.0 }
fn default_buffer_size() -> usize { 1 }
fn default_batch_size() -> usize { 100 }
fn default_database_path() -> PathBuf { PathBuf::from("parley.db") }
fn default_sender() -> String { "no-reply@example.com".to_string() }
fn default_organization() -> String { "Palm Mind Technology".to_string() }
fn default_bind_addr() -> String { "127.0.0.1:8000".to_string() }
fn default_max_upload_bytes() -> usize { 20 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }

fn default_google_endpoint() -> EmbeddingEndpoint {
    EmbeddingEndpoint {
        api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        model: "text-embedding-004".to_string(),
        api_key: None,
        api_key_env: Some("GOOGLE_API_KEY".to_string()),
        timeout_seconds: default_request_timeout(),
        max_batch_size: default_batch_size(),
    }
}

fn default_bge_endpoint() -> EmbeddingEndpoint {
    EmbeddingEndpoint {
        api_base_url: "https://api-inference.huggingface.co".to_string(),
        model: "BAAI/bge-small-en-v1.5".to_string(),
        api_key: None,
        api_key_env: Some("HUGGINGFACE_API_KEY".to_string()),
        timeout_seconds: default_request_timeout(),
        max_batch_size: 32,
    }
}

impl ParleyConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.name.is_empty() {
            return Err(AgentError::ConfigError("Agent name cannot be empty".to_string()));
        }

        if self.agent.max_cycles == 0 {
            return Err(AgentError::ConfigError(
                "Agent max_cycles must be greater than 0".to_string(),
            ));
        }

        if self.agent.history_window == Some(0) {
            return Err(AgentError::ConfigError(
                "Agent history_window must be greater than 0 when set".to_string(),
            ));
        }

        if self.llm.model.is_empty() {
            return Err(AgentError::ConfigError("LLM model cannot be empty".to_string()));
        }

        if self.rag.top_k == 0 {
            return Err(AgentError::ConfigError("RAG top_k must be greater than 0".to_string()));
        }

        let text = &self.rag.text_processing;
        if text.chunk_size == 0 {
            return Err(AgentError::ConfigError(
                "RAG chunk size must be greater than 0".to_string(),
            ));
        }
        if text.chunk_overlap >= text.chunk_size {
            return Err(AgentError::ConfigError(format!(
                "RAG chunk overlap ({}) must be smaller than chunk size ({})",
                text.chunk_overlap, text.chunk_size
            )));
        }
        if !(text.semantic_breakpoint_percentile > 0.0 && text.semantic_breakpoint_percentile <= 100.0) {
            return Err(AgentError::ConfigError(
                "Semantic breakpoint percentile must be within (0, 100]".to_string(),
            ));
        }

        if self.rag.collection.is_empty() {
            return Err(AgentError::ConfigError("RAG collection name cannot be empty".to_string()));
        }

        if self.mail.sender.is_empty() {
            return Err(AgentError::ConfigError("Mail sender cannot be empty".to_string()));
        }

        if let MailTransport::Http { endpoint } = &self.mail.transport {
            if endpoint.is_empty() {
                return Err(AgentError::ConfigError(
                    "Mail relay endpoint cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

//! Core library for a retrieval-augmented, tool-calling conversational agent.
//!
//! Documents are ingested into a vector index, and user turns are answered by
//! an orchestration loop that alternates between a language-model reasoning
//! step and the execution of the tools it requests.
//!
//! # Architecture Overview
//!
//! - **Agent orchestration**: the reasoning / tool-execution state machine with a cycle guard
//! - **Chat service**: the session-scoped invocation boundary over the loop
//! - **Language model integration**: OpenAI-compatible and Gemini providers
//! - **Tool registry**: schema-validated tools for document search and interview booking
//! - **Conversation history**: session-keyed message log with per-session serialization
//! - **Retrieval augmentation**: chunking, embeddings, vector search and ingestion
//! - **Booking and mail**: persisted bookings confirmed by email
//! - **Configuration system**: YAML configuration with environment resolution

pub mod agent;
pub mod booking;
pub mod chat;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod llm;
pub mod mail;
pub mod memory;
pub mod rag;
pub mod storage;
pub mod tools;

pub use agent::{AgentConfig, LoopRun, Orchestrator, Termination};
pub use chat::{ChatReply, ChatService};
pub use config::*;
pub use errors::AgentError;
pub use llm::LLM;
pub use tools::{Tool, ToolRegistry};

#[cfg(test)]
pub mod test_utils;

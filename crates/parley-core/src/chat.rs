//! The invocation boundary: one user turn in, one assistant answer out
//!
//! `ChatService` loads the session's history, runs the orchestration loop on
//! it and writes the produced turns back. Invocations on the same session are
//! serialized; different sessions run concurrently.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentConfig, LoopRun, Orchestrator, Termination};
use crate::core_types::Message;
use crate::errors::AgentError;
use crate::llm::LLM;
use crate::memory::{trim_history, ConversationHistoryStore, SessionLocks};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct ChatService {
    orchestrator: Orchestrator,
    history: Arc<dyn ConversationHistoryStore>,
    locks: SessionLocks,
    system_prompt: String,
    history_window: Option<usize>,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LLM>,
        registry: Arc<ToolRegistry>,
        history: Arc<dyn ConversationHistoryStore>,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            orchestrator: Orchestrator::new(llm, registry, config)?,
            history,
            locks: SessionLocks::new(),
            system_prompt: config.system_prompt.clone(),
            history_window: config.history_window,
        })
    }

    pub async fn invoke(&self, session_id: &str, user_text: &str) -> Result<ChatReply, AgentError> {
        self.invoke_with_cancel(session_id, user_text, &CancellationToken::new())
            .await
    }

    /// Like `invoke`, but stops starting new loop phases once `cancel` fires.
    ///
    /// A cancelled invocation returns `AgentError::Cancelled`. Its turns are
    /// still written to history when a tool already ran, so a retry sees the
    /// completed side effects instead of repeating them.
    pub async fn invoke_with_cancel(
        &self,
        session_id: &str,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, AgentError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AgentError::InvalidRequest("session_id must not be empty".to_string()));
        }
        if user_text.trim().is_empty() {
            return Err(AgentError::InvalidRequest("user_input must not be empty".to_string()));
        }

        let _session = self.locks.acquire(session_id).await;
        log::info!("Invocation started for session {}", session_id);

        let mut warnings = Vec::new();
        let history = match self.history.read(session_id).await {
            Ok(history) => trim_history(history, self.history_window),
            Err(e) => {
                log::warn!("Could not load history for session {}: {}", session_id, e);
                warnings.push(format!("Conversation history unavailable: {}", e));
                Vec::new()
            }
        };

        let user_turn = Message::user(user_text);
        let mut context = Vec::with_capacity(history.len() + 2);
        context.push(Message::system(self.system_prompt.clone()));
        context.extend(history);
        context.push(user_turn.clone());

        let run = self.orchestrator.run(context, cancel).await?;
        let response = match run.termination {
            Termination::Cancelled => {
                if run.cycles == 0 {
                    log::warn!("Invocation for session {} cancelled; nothing persisted", session_id);
                } else {
                    log::warn!(
                        "Invocation for session {} cancelled after {} tool round-trip(s); keeping its turns",
                        session_id,
                        run.cycles
                    );
                    self.persist(session_id, user_turn, run.new_messages, &mut warnings).await;
                }
                return Err(AgentError::Cancelled);
            }
            Termination::Degraded => {
                warnings.push("The language model was unavailable; a fallback answer was returned.".to_string());
                final_text(&run)?
            }
            Termination::CycleLimit => {
                warnings.push(format!(
                    "Stopped after {} tool round-trips without a final answer.",
                    self.orchestrator.max_cycles()
                ));
                final_text(&run)?
            }
            Termination::FinalAnswer => final_text(&run)?,
        };

        self.persist(session_id, user_turn, run.new_messages, &mut warnings).await;
        Ok(ChatReply { response, warnings })
    }

    async fn persist(
        &self,
        session_id: &str,
        user_turn: Message,
        new_messages: Vec<Message>,
        warnings: &mut Vec<String>,
    ) {
        let mut produced = Vec::with_capacity(new_messages.len() + 1);
        produced.push(user_turn);
        produced.extend(new_messages);
        if let Err(e) = self.history.append(session_id, &produced).await {
            log::error!("Failed to persist {} turns for session {}: {}", produced.len(), session_id, e);
            warnings.push(format!("Conversation history was not saved: {}", e));
        }
    }
}

fn final_text(run: &LoopRun) -> Result<String, AgentError> {
    run.final_text()
        .map(str::to_string)
        .ok_or_else(|| AgentError::Orchestration("loop finished without an assistant answer".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{LLMResponse, Role, ToolCall};
    use crate::llm::OpenAIClient;
    use crate::memory::InMemoryHistoryStore;
    use crate::rag::{DummyEmbeddingGenerator, InMemoryVectorStore, VectorRetriever};
    use crate::test_utils::MockLLMServer;
    use crate::tools::DocumentRetrieverTool;
    use axum::http::StatusCode;
    use serde_json::json;

    fn registry() -> Arc<ToolRegistry> {
        let retriever = VectorRetriever::new(
            Arc::new(DummyEmbeddingGenerator::new()),
            Arc::new(InMemoryVectorStore::new()),
            "documents-bge",
        );
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(DocumentRetrieverTool::new(Arc::new(retriever), 3)))
            .unwrap();
        Arc::new(registry)
    }

    fn service(server: &MockLLMServer, history: Arc<InMemoryHistoryStore>) -> ChatService {
        let llm = OpenAIClient::new("test-key".to_string(), "gpt-4o-mini".to_string())
            .with_api_base(server.api_base());
        ChatService::new(Arc::new(llm), registry(), history, &AgentConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_refund_question_without_documents() {
        let _ = env_logger::builder().is_test(true).try_init();
        let server = MockLLMServer::start(vec![
            Ok(LLMResponse::calls(vec![ToolCall::new(
                "call_1",
                "document_retriever",
                json!({"query": "refund policy"}),
            )])),
            Ok(LLMResponse::text(
                "I couldn't find a refund policy in the documents, so I can't say.",
            )),
        ])
        .await;
        let history = Arc::new(InMemoryHistoryStore::new());
        let chat = service(&server, history.clone());

        let reply = chat.invoke("s1", "What is the refund policy?").await.unwrap();
        assert!(reply.response.contains("couldn't find"));
        assert!(reply.warnings.is_empty());

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["messages"][0]["role"], "system");
        assert_eq!(requests[0]["tools"][0]["function"]["name"], "document_retriever");
        let tool_turn = requests[1]["messages"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["role"] == "tool")
            .cloned()
            .unwrap();
        assert_eq!(
            tool_turn["content"],
            "No relevant information found in the ingested documents."
        );

        let saved = history.read("s1").await.unwrap();
        let roles: Vec<Role> = saved.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_model_outage_returns_fallback() {
        let server = MockLLMServer::start(vec![Err(StatusCode::INTERNAL_SERVER_ERROR)]).await;
        let chat = service(&server, Arc::new(InMemoryHistoryStore::new()));

        let reply = chat.invoke("s1", "hello").await.unwrap();
        assert_eq!(reply.response, crate::agent::DEGRADED_REPLY);
        assert_eq!(reply.warnings.len(), 1);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_prior_turns_are_sent_to_the_model() {
        let server = MockLLMServer::start(vec![
            Ok(LLMResponse::text("Nice to meet you, Jane.")),
            Ok(LLMResponse::text("Your name is Jane.")),
        ])
        .await;
        let chat = service(&server, Arc::new(InMemoryHistoryStore::new()));

        chat.invoke("s1", "Hi, I'm Jane").await.unwrap();
        chat.invoke("s1", "What's my name?").await.unwrap();

        let second = &server.requests()[1]["messages"];
        let contents: Vec<&str> = second
            .as_array()
            .unwrap()
            .iter()
            .skip(1)
            .map(|m| m["content"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(contents, vec!["Hi, I'm Jane", "Nice to meet you, Jane.", "What's my name?"]);

        server.shutdown().await;
    }
}

//! Construction of the long-lived services shared by every request.

use std::sync::Arc;

use parley_core::agent::AgentConfig;
use parley_core::booking::{BookingService, SqliteBookingStore};
use parley_core::chat::ChatService;
use parley_core::config::ParleyConfig;
use parley_core::llm::{create_llm_client, ToolMetadata, LLM};
use parley_core::mail::{create_mailer, MailSettings};
use parley_core::memory::{ConversationHistoryStore, SqliteHistoryStore};
use parley_core::rag::{
    collection_name, EmbeddingModels, InMemoryVectorStore, IngestionPipeline, PersistentVectorStore,
    SqliteIngestionLog, VectorRetriever, VectorStore,
};
use parley_core::storage::Database;
use parley_core::tools::{BookInterviewTool, DocumentRetrieverTool, ToolRegistry};
use parley_core::AgentError;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub ingestion: Arc<IngestionPipeline>,
    pub tools: Arc<Vec<ToolMetadata>>,
}

/// Everything the tools and the chat service need, built from configuration.
pub struct Services {
    pub llm: Arc<dyn LLM>,
    pub history: Arc<dyn ConversationHistoryStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embeddings: EmbeddingModels,
    pub database: Database,
}

impl Services {
    pub async fn from_config(config: &ParleyConfig) -> Result<Self, AgentError> {
        let database = Database::open(&config.storage.database_path).await?;

        let vector_store: Arc<dyn VectorStore> = match &config.rag.vector_store.persistence_path {
            Some(path) => Arc::new(PersistentVectorStore::open(path.clone()).await?),
            None => {
                log::warn!("No vector store persistence path configured; ingested documents live in memory only");
                Arc::new(InMemoryVectorStore::new())
            }
        };

        Ok(Self {
            llm: create_llm_client(&config.llm)?,
            history: Arc::new(SqliteHistoryStore::new(database.clone())),
            vector_store,
            embeddings: EmbeddingModels::from_config(&config.rag.embeddings)?,
            database,
        })
    }
}

impl AppState {
    pub fn build(config: &ParleyConfig, services: Services) -> Result<Self, AgentError> {
        let retrieval_model = config.rag.retrieval_model;
        let retriever = VectorRetriever::new(
            services.embeddings.get(retrieval_model),
            services.vector_store.clone(),
            collection_name(&config.rag.collection, retrieval_model),
        );

        let booking = BookingService::new(
            Arc::new(SqliteBookingStore::new(services.database.clone())),
            create_mailer(&config.mail)?,
            MailSettings::from(&config.mail),
        );

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(DocumentRetrieverTool::new(
            Arc::new(retriever),
            config.rag.top_k,
        )))?;
        registry.register(Arc::new(BookInterviewTool::new(Arc::new(booking))))?;
        let registry = Arc::new(registry);
        log::info!("Registered {} tools", registry.tool_count());

        let chat = ChatService::new(
            services.llm,
            registry.clone(),
            services.history,
            &AgentConfig::from(&config.agent),
        )?;

        let ingestion = IngestionPipeline::new(
            services.embeddings,
            services.vector_store,
            Arc::new(SqliteIngestionLog::new(services.database)),
            &config.rag,
        );

        Ok(Self {
            chat: Arc::new(chat),
            ingestion: Arc::new(ingestion),
            tools: Arc::new(registry.describe_all()),
        })
    }
}

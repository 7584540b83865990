//! Retrieval-augmented generation: ingestion, embeddings and search
//!
//! Documents are split into chunks (fixed overlapping windows or semantic
//! boundaries), embedded with one of the supported embedding models and
//! upserted into a vector collection dedicated to that model. At question
//! time the `Retriever` embeds the query with the configured retrieval model
//! and returns the best matching snippets for the agent to ground its answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::AgentError;

pub mod embeddings;
pub mod ingestion;
pub mod semantic;
pub mod splitter;
pub mod vector_store;

pub use embeddings::*;
pub use ingestion::*;
pub use semantic::SemanticChunker;
pub use splitter::TextSplitter;
pub use vector_store::*;

/// Name of the vector collection holding vectors of `model`.
pub fn collection_name(base: &str, model: EmbeddingModel) -> String {
    format!("{}-{}", base, model.as_str())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    pub chunk_index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Snippet texts joined by `separator`, best match first.
    pub fn join_contents(&self, separator: &str) -> String {
        self.chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Opaque search collaborator returning ranked snippets for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievedContext, AgentError>;
}

/// Retriever over a vector store collection.
pub struct VectorRetriever {
    embedder: Arc<dyn EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingGenerator>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievedContext, AgentError> {
        log::info!("Retrieving top {} chunks from '{}' for: {}", top_k, self.collection, query);

        if self.store.count(&self.collection).await == 0 {
            return Ok(RetrievedContext::default());
        }

        let query_embedding = self.embedder.generate_embedding(query).await?;
        let hits = self
            .store
            .search(&self.collection, &query_embedding, top_k)
            .await?;

        Ok(RetrievedContext {
            chunks: hits
                .into_iter()
                .map(|hit| RetrievedChunk {
                    content: hit.content,
                    source: hit.source,
                    chunk_index: hit.chunk_index,
                    score: hit.score,
                })
                .collect(),
        })
    }
}

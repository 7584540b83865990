//! Document ingestion: extract, chunk, embed and upsert.

use crate::config::{RagSettings, TextProcessingConfig};
use crate::errors::AgentError;
use crate::rag::embeddings::{EmbeddingModel, EmbeddingModels};
use crate::rag::semantic::SemanticChunker;
use crate::rag::splitter::TextSplitter;
use crate::rag::vector_store::{VectorPoint, VectorStore};
use crate::rag::collection_name;
use crate::storage::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Chunking strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Fixed-size overlapping windows.
    Recursive,
    /// Boundaries where consecutive sentences diverge in meaning.
    Semantic,
}

impl ChunkingStrategy {
    pub fn parse(selector: &str) -> Result<Self, AgentError> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "recursive" | "fixed" => Ok(ChunkingStrategy::Recursive),
            "semantic" => Ok(ChunkingStrategy::Semantic),
            other => Err(AgentError::InvalidRequest(format!(
                "Unsupported chunking strategy '{}'. Expected 'recursive' or 'semantic'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Recursive => "recursive",
            ChunkingStrategy::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Determine the kind from a MIME type hint, falling back to the file
    /// extension.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Result<Self, AgentError> {
        let mime = content_type
            .map(|c| c.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());
        match mime.as_deref() {
            Some("application/pdf") => return Ok(DocumentKind::Pdf),
            Some("text/plain") => return Ok(DocumentKind::Text),
            _ => {}
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some("txt") => Ok(DocumentKind::Text),
            _ => Err(AgentError::InvalidRequest(format!(
                "Unsupported file type for '{}'. Only .pdf and .txt files are accepted",
                file_name
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub chunking_strategy: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionMetadata {
    pub id: i64,
    pub file_name: String,
    pub chunking_strategy: ChunkingStrategy,
    pub embedding_model: EmbeddingModel,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIngestion {
    pub file_name: String,
    pub chunking_strategy: ChunkingStrategy,
    pub embedding_model: EmbeddingModel,
    pub chunk_count: usize,
}

/// Durable log of completed ingestions.
#[async_trait]
pub trait IngestionLog: Send + Sync {
    async fn record(&self, entry: NewIngestion) -> Result<IngestionMetadata, AgentError>;
    async fn list(&self) -> Result<Vec<IngestionMetadata>, AgentError>;
}

pub struct SqliteIngestionLog {
    db: Database,
}

impl SqliteIngestionLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IngestionLog for SqliteIngestionLog {
    async fn record(&self, entry: NewIngestion) -> Result<IngestionMetadata, AgentError> {
        let created_at = Utc::now();
        let row = entry.clone();
        let id = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO ingestion_metadata
                        (file_name, chunking_strategy, embedding_model, chunk_count, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        row.file_name,
                        row.chunking_strategy.as_str(),
                        row.embedding_model.as_str(),
                        row.chunk_count as i64,
                        created_at.to_rfc3339()
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(IngestionMetadata {
            id,
            file_name: entry.file_name,
            chunking_strategy: entry.chunking_strategy,
            embedding_model: entry.embedding_model,
            chunk_count: entry.chunk_count,
            created_at,
        })
    }

    async fn list(&self) -> Result<Vec<IngestionMetadata>, AgentError> {
        let rows: Vec<(i64, String, String, String, i64, String)> = self
            .db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, file_name, chunking_strategy, embedding_model, chunk_count, created_at
                     FROM ingestion_metadata ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, file_name, strategy, model, chunk_count, created_at)| {
                Ok(IngestionMetadata {
                    id,
                    file_name,
                    chunking_strategy: ChunkingStrategy::parse(&strategy)
                        .map_err(|e| AgentError::Storage(e.to_string()))?,
                    embedding_model: EmbeddingModel::parse(&model)
                        .map_err(|e| AgentError::Storage(e.to_string()))?,
                    chunk_count: chunk_count as usize,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| AgentError::Storage(format!("Invalid timestamp: {}", e)))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryIngestionLog {
    entries: Mutex<Vec<IngestionMetadata>>,
}

impl InMemoryIngestionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IngestionLog for InMemoryIngestionLog {
    async fn record(&self, entry: NewIngestion) -> Result<IngestionMetadata, AgentError> {
        let mut entries = self.entries.lock().await;
        let metadata = IngestionMetadata {
            id: entries.len() as i64 + 1,
            file_name: entry.file_name,
            chunking_strategy: entry.chunking_strategy,
            embedding_model: entry.embedding_model,
            chunk_count: entry.chunk_count,
            created_at: Utc::now(),
        };
        entries.push(metadata.clone());
        Ok(metadata)
    }

    async fn list(&self) -> Result<Vec<IngestionMetadata>, AgentError> {
        Ok(self.entries.lock().await.clone())
    }
}

pub struct IngestionPipeline {
    embeddings: EmbeddingModels,
    store: Arc<dyn VectorStore>,
    log: Arc<dyn IngestionLog>,
    collection: String,
    text: TextProcessingConfig,
}

impl IngestionPipeline {
    pub fn new(
        embeddings: EmbeddingModels,
        store: Arc<dyn VectorStore>,
        log: Arc<dyn IngestionLog>,
        settings: &RagSettings,
    ) -> Self {
        Self {
            embeddings,
            store,
            log,
            collection: settings.collection.clone(),
            text: settings.text_processing.clone(),
        }
    }

    pub async fn ingest(&self, request: IngestionRequest) -> Result<IngestionMetadata, AgentError> {
        // Reject bad input before any extraction or embedding work
        let file_name = request.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(AgentError::InvalidRequest("File name cannot be empty".to_string()));
        }
        let strategy = ChunkingStrategy::parse(&request.chunking_strategy)?;
        let model = EmbeddingModel::parse(&request.embedding_model)?;
        let kind = DocumentKind::detect(&file_name, request.content_type.as_deref())?;

        log::info!(
            "Ingesting '{}' ({:?}, {} bytes) with {} chunking and {} embeddings",
            file_name,
            kind,
            request.bytes.len(),
            strategy,
            model
        );

        let text = extract_text(kind, request.bytes).await?;
        if text.trim().is_empty() {
            return Err(AgentError::InvalidRequest(format!(
                "Document '{}' contains no text",
                file_name
            )));
        }

        let embedder = self.embeddings.get(model);
        let chunks = match strategy {
            ChunkingStrategy::Recursive => {
                TextSplitter::new(self.text.chunk_size, self.text.chunk_overlap).split_text(&text)
            }
            ChunkingStrategy::Semantic => {
                SemanticChunker::new(
                    self.text.semantic_breakpoint_percentile,
                    self.text.semantic_buffer_size,
                )?
                .split_text(&text, embedder.as_ref())
                .await?
            }
        };

        let vectors = embedder.generate_embeddings(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(AgentError::RagError(format!(
                "Expected {} chunk embeddings for '{}', got {}",
                chunks.len(),
                file_name,
                vectors.len()
            )));
        }
        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (content, embedding))| {
                VectorPoint::new(file_name.clone(), index, content, embedding)
                    .with_metadata("chunking_strategy", strategy.as_str())
                    .with_metadata("embedding_model", model.as_str())
            })
            .collect();

        let collection = collection_name(&self.collection, model);
        let replaced = self.store.delete_source(&collection, &file_name).await?;
        if replaced > 0 {
            log::info!("Replaced {} existing chunks of '{}'", replaced, file_name);
        }
        let chunk_count = self.store.upsert(&collection, points).await?;

        let metadata = self
            .log
            .record(NewIngestion {
                file_name,
                chunking_strategy: strategy,
                embedding_model: model,
                chunk_count,
            })
            .await?;

        log::info!(
            "Ingested '{}' into '{}' as {} chunks",
            metadata.file_name,
            collection,
            metadata.chunk_count
        );
        Ok(metadata)
    }
}

async fn extract_text(kind: DocumentKind, bytes: Vec<u8>) -> Result<String, AgentError> {
    match kind {
        DocumentKind::Text => String::from_utf8(bytes).map_err(|_| {
            AgentError::InvalidRequest("Text file is not valid UTF-8".to_string())
        }),
        DocumentKind::Pdf => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
                AgentError::InvalidRequest(format!("Failed to extract text from PDF: {}", e))
            })
        })
        .await
        .map_err(|e| AgentError::RagError(format!("PDF extraction task failed: {}", e)))?,
    }
}

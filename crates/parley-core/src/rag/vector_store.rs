use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::errors::AgentError;
use crate::rag::embeddings::cosine_similarity;

/// One embedded chunk. Points are identified by their source file and
/// position within it, so re-ingesting a file overwrites its points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub source: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl VectorPoint {
    pub fn new(source: impl Into<String>, chunk_index: usize, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            source: source.into(),
            chunk_index,
            content: content.into(),
            embedding,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn key(&self) -> String {
        point_key(&self.source, self.chunk_index)
    }
}

fn point_key(source: &str, chunk_index: usize) -> String {
    format!("{}#{:08}", source, chunk_index)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub source: String,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace points, returning how many were written.
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<usize, AgentError>;

    /// Best `top_k` points by cosine similarity. An unknown collection has no hits.
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, AgentError>;

    /// Remove every point of `source`, returning how many were removed.
    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize, AgentError>;

    async fn count(&self, collection: &str) -> usize;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    dimension: Option<usize>,
    points: BTreeMap<String, VectorPoint>,
}

impl Collection {
    fn upsert(&mut self, points: Vec<VectorPoint>) -> Result<usize, AgentError> {
        let expected = self
            .dimension
            .or_else(|| points.first().map(|p| p.embedding.len()));

        if let Some(expected_dim) = expected {
            if expected_dim == 0 {
                return Err(AgentError::RagError("Embeddings cannot be empty".to_string()));
            }
            if let Some(bad) = points.iter().find(|p| p.embedding.len() != expected_dim) {
                return Err(AgentError::RagError(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected_dim,
                    bad.embedding.len()
                )));
            }
            self.dimension = Some(expected_dim);
        }

        let written = points.len();
        for point in points {
            self.points.insert(point.key(), point);
        }
        Ok(written)
    }

    fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>, AgentError> {
        if self.points.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if let Some(expected_dim) = self.dimension {
            if query_embedding.len() != expected_dim {
                return Err(AgentError::RagError(format!(
                    "Query embedding dimension mismatch: expected {}, got {}",
                    expected_dim,
                    query_embedding.len()
                )));
            }
        }

        let mut results: Vec<SearchHit> = self
            .points
            .values()
            .map(|point| SearchHit {
                source: point.source.clone(),
                chunk_index: point.chunk_index,
                content: point.content.clone(),
                score: cosine_similarity(query_embedding, &point.embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        results.truncate(top_k);
        Ok(results)
    }

    fn delete_source(&mut self, source: &str) -> usize {
        let before = self.points.len();
        self.points.retain(|_, point| point.source != source);
        before - self.points.len()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<usize, AgentError> {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().upsert(points)
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, AgentError> {
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(c) => c.search(query_embedding, top_k),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize, AgentError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|c| c.delete_source(source))
            .unwrap_or(0))
    }

    async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

/// Vector store backed by a JSON file, rewritten after every mutation.
#[derive(Debug)]
pub struct PersistentVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    file_path: PathBuf,
}

impl PersistentVectorStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, AgentError> {
        let file_path = path.into();
        let collections = match tokio::fs::read_to_string(&file_path).await {
            Ok(data) => serde_json::from_str(&data).map_err(|e| {
                AgentError::RagError(format!("Failed to deserialize vector store: {}", e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AgentError::RagError(format!(
                    "Failed to read vector store file: {}",
                    e
                )))
            }
        };

        log::info!(
            "Opened vector store {} with {} collections",
            file_path.display(),
            collections.len()
        );

        Ok(Self {
            collections: RwLock::new(collections),
            file_path,
        })
    }

    async fn save(&self, collections: &HashMap<String, Collection>) -> Result<(), AgentError> {
        let data = serde_json::to_string(collections).map_err(|e| {
            AgentError::RagError(format!("Failed to serialize vector store: {}", e))
        })?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp_path = self.file_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, data).await.map_err(|e| {
            AgentError::RagError(format!("Failed to write vector store to file: {}", e))
        })?;
        tokio::fs::rename(&tmp_path, &self.file_path).await.map_err(|e| {
            AgentError::RagError(format!("Failed to replace vector store file: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PersistentVectorStore {
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<usize, AgentError> {
        let mut collections = self.collections.write().await;
        let written = collections
            .entry(collection.to_string())
            .or_default()
            .upsert(points)?;
        self.save(&collections).await?;
        Ok(written)
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, AgentError> {
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(c) => c.search(query_embedding, top_k),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_source(&self, collection: &str, source: &str) -> Result<usize, AgentError> {
        let mut collections = self.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .map(|c| c.delete_source(source))
            .unwrap_or(0);
        if removed > 0 {
            self.save(&collections).await?;
        }
        Ok(removed)
    }

    async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

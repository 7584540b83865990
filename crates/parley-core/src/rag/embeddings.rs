use crate::config::{EmbeddingEndpoint, EmbeddingsConfig};
use crate::errors::AgentError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AgentError>;

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        let mut embeddings = Vec::new();
        for text in texts {
            let embedding = self.generate_embedding(text).await?;
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }

    fn embedding_dimension(&self) -> usize;
}

/// Embedding model selector accepted by ingestion and retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingModel {
    /// Google `text-embedding-004`, 768 dimensions.
    #[default]
    Google,
    /// `BAAI/bge-small-en-v1.5`, 384 dimensions, L2-normalized.
    Bge,
}

impl EmbeddingModel {
    pub fn parse(selector: &str) -> Result<Self, AgentError> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(EmbeddingModel::Google),
            "bge" => Ok(EmbeddingModel::Bge),
            other => Err(AgentError::InvalidRequest(format!(
                "Unsupported embedding model '{}'. Expected 'google' or 'bge'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingModel::Google => "google",
            EmbeddingModel::Bge => "bge",
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingModel::Google => 768,
            EmbeddingModel::Bge => 384,
        }
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic hash-based embeddings for tests and offline runs.
pub struct DummyEmbeddingGenerator {
    embedding_dimension: usize,
}

impl DummyEmbeddingGenerator {
    pub fn new() -> Self {
        Self {
            embedding_dimension: 384,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            embedding_dimension: dimension,
        }
    }
}

impl Default for DummyEmbeddingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingGenerator for DummyEmbeddingGenerator {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();

        let mut embedding: Vec<f32> = (0..self.embedding_dimension)
            .map(|i| {
                let seed = hash.wrapping_mul(31).wrapping_add(i as u64 * 7919);
                ((seed % 1000) as f32 - 500.0) / 500.0
            })
            .collect();

        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for val in vector.iter_mut() {
            *val /= magnitude;
        }
    }
}

/// Supported embedding providers
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingProvider {
    Google,
    HuggingFace,
}

#[derive(Debug, Clone)]
pub struct RestEmbeddingConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub model_name: String,
    pub embedding_dimension: usize,
    pub timeout_seconds: u64,
    pub max_batch_size: usize,
    pub provider: EmbeddingProvider,
    pub normalize: bool,
}

impl RestEmbeddingConfig {
    pub fn for_model(model: EmbeddingModel, endpoint: &EmbeddingEndpoint) -> Self {
        Self {
            api_base_url: endpoint.api_base_url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            model_name: endpoint.model.clone(),
            embedding_dimension: model.dimension(),
            timeout_seconds: endpoint.timeout_seconds,
            max_batch_size: endpoint.max_batch_size.max(1),
            provider: match model {
                EmbeddingModel::Google => EmbeddingProvider::Google,
                EmbeddingModel::Bge => EmbeddingProvider::HuggingFace,
            },
            normalize: model == EmbeddingModel::Bge,
        }
    }
}

pub struct RestEmbeddingClient {
    client: Client,
    config: RestEmbeddingConfig,
}

#[derive(Debug, Deserialize)]
struct GoogleBatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<GoogleEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GoogleEmbedding {
    values: Vec<f32>,
}

impl RestEmbeddingClient {
    pub fn new(config: RestEmbeddingConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AgentError::RagError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RestEmbeddingConfig {
        &self.config
    }

    pub fn create_batches(&self, texts: &[String]) -> Vec<Vec<String>> {
        texts
            .chunks(self.config.max_batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    fn api_key(&self) -> Result<&str, AgentError> {
        self.config.api_key.as_deref().ok_or_else(|| {
            AgentError::RagError(format!(
                "{:?} embedding API key not configured",
                self.config.provider
            ))
        })
    }

    async fn call_google_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.config.api_base_url, self.config.model_name
        );
        let model_path = format!("models/{}", self.config.model_name);

        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model_path,
                    "content": {"parts": [{"text": text}]}
                })
            })
            .collect();

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| AgentError::RagError(format!("Google embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::RagError(format!(
                "Google embedding API error {}: {}",
                status, error_text
            )));
        }

        let parsed: GoogleBatchEmbedResponse = response.json().await.map_err(|e| {
            AgentError::RagError(format!("Failed to parse Google embedding response: {}", e))
        })?;

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    async fn call_huggingface_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        let api_key = self.api_key()?;

        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.config.api_base_url, self.config.model_name
        );

        let payload = json!({
            "inputs": texts,
            "options": {
                "wait_for_model": true
            }
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AgentError::RagError(format!("HuggingFace API request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::RagError(format!(
                "HuggingFace API error: {}",
                error_text
            )));
        }

        let embeddings: Vec<Vec<f32>> = response.json().await.map_err(|e| {
            AgentError::RagError(format!("Failed to parse HuggingFace response: {}", e))
        })?;

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingGenerator for RestEmbeddingClient {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let embeddings = self.generate_embeddings(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::RagError("No embedding returned from API".to_string()))
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        log::info!(
            "Generating embeddings for {} texts using {:?} provider",
            texts.len(),
            self.config.provider
        );

        let batches = self.create_batches(texts);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in batches.iter().enumerate() {
            log::debug!(
                "Processing batch {}/{} ({} texts)",
                i + 1,
                batches.len(),
                batch.len()
            );

            let batch_embeddings = match self.config.provider {
                EmbeddingProvider::Google => self.call_google_api(batch).await?,
                EmbeddingProvider::HuggingFace => self.call_huggingface_api(batch).await?,
            };

            if batch_embeddings.len() != batch.len() {
                return Err(AgentError::RagError(format!(
                    "Embedding API returned {} vectors for {} inputs",
                    batch_embeddings.len(),
                    batch.len()
                )));
            }

            all_embeddings.extend(batch_embeddings);

            // Small delay between batches to respect rate limits
            if i + 1 < batches.len() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        if self.config.normalize {
            all_embeddings.iter_mut().for_each(|e| l2_normalize(e));
        }

        Ok(all_embeddings)
    }

    fn embedding_dimension(&self) -> usize {
        self.config.embedding_dimension
    }
}

/// One embedding client per supported model, built once at startup.
#[derive(Clone)]
pub struct EmbeddingModels {
    google: Arc<dyn EmbeddingGenerator>,
    bge: Arc<dyn EmbeddingGenerator>,
}

impl EmbeddingModels {
    pub fn new(google: Arc<dyn EmbeddingGenerator>, bge: Arc<dyn EmbeddingGenerator>) -> Self {
        Self { google, bge }
    }

    pub fn from_config(config: &EmbeddingsConfig) -> Result<Self, AgentError> {
        let google = RestEmbeddingClient::new(RestEmbeddingConfig::for_model(
            EmbeddingModel::Google,
            &config.google,
        ))?;
        let bge = RestEmbeddingClient::new(RestEmbeddingConfig::for_model(
            EmbeddingModel::Bge,
            &config.bge,
        ))?;
        Ok(Self::new(Arc::new(google), Arc::new(bge)))
    }

    pub fn get(&self, model: EmbeddingModel) -> Arc<dyn EmbeddingGenerator> {
        match model {
            EmbeddingModel::Google => self.google.clone(),
            EmbeddingModel::Bge => self.bge.clone(),
        }
    }
}

//! Document retrieval tool backed by the ingested vector collection

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::AgentError;
use crate::llm::ToolMetadata;
use crate::rag::Retriever;
use crate::tools::Tool;

pub const DOCUMENT_RETRIEVER: &str = "document_retriever";
pub const NO_RESULTS: &str = "No relevant information found in the ingested documents.";
const SNIPPET_SEPARATOR: &str = "\n---\n";

pub struct DocumentRetrieverTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl DocumentRetrieverTool {
    pub fn new(retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        Self {
            retriever,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for DocumentRetrieverTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: DOCUMENT_RETRIEVER.to_string(),
            description: "Retrieves relevant information from the ingested documents based on a user's query.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The question or keywords to search the documents for",
                        "minLength": 1
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String, AgentError> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AgentError::ToolError {
                tool_name: DOCUMENT_RETRIEVER.to_string(),
                message: "Missing required parameter: query".to_string(),
            })?;

        let context = self
            .retriever
            .retrieve(query, self.top_k)
            .await
            .map_err(|e| AgentError::ToolError {
                tool_name: DOCUMENT_RETRIEVER.to_string(),
                message: format!("Document search failed: {}", e),
            })?;

        if context.is_empty() {
            log::info!("No documents matched query '{}'", query);
            return Ok(NO_RESULTS.to_string());
        }

        log::debug!("Retrieved {} chunks for '{}'", context.len(), query);
        Ok(context.join_contents(SNIPPET_SEPARATOR))
    }
}

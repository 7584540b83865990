//! Tool system exposing invocable capabilities to the reasoning step
//!
//! A tool pairs a descriptor (name, purpose and JSON argument schema) with an
//! asynchronous handler. Tools are registered once at startup into a
//! `ToolRegistry`, which compiles each argument schema, rejects duplicate
//! names and is read-only afterwards. Dispatch is a lookup by name followed by
//! schema validation of the arguments, so handlers only ever see arguments
//! that match what they advertised.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::AgentError;
use crate::llm::ToolMetadata;

pub mod book_interview;
pub mod document_search;

pub use book_interview::{BookInterviewArgs, BookInterviewTool};
pub use document_search::DocumentRetrieverTool;

// Core Tool trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;
    async fn execute(&self, arguments: Value) -> Result<String, AgentError>;
}

/// A tool together with its descriptor and compiled argument schema.
pub struct RegisteredTool {
    metadata: ToolMetadata,
    schema: JSONSchema,
    handler: Arc<dyn Tool>,
}

impl RegisteredTool {
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub fn handler(&self) -> Arc<dyn Tool> {
        self.handler.clone()
    }

    /// Check `arguments` against the tool's schema, reporting every violation.
    pub fn validate_arguments(&self, arguments: &Value) -> Result<(), AgentError> {
        if let Err(errors) = self.schema.validate(arguments) {
            let message = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{} (at {})", e, path)
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AgentError::ArgumentValidation {
                tool_name: self.metadata.name.clone(),
                message,
            });
        }
        Ok(())
    }
}

/// Registry of tools, kept in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let metadata = tool.metadata();
        if self.index.contains_key(&metadata.name) {
            return Err(AgentError::DuplicateTool(metadata.name));
        }

        let schema = JSONSchema::compile(&metadata.input_schema).map_err(|e| {
            AgentError::ConfigError(format!(
                "Tool '{}' has an invalid argument schema: {}",
                metadata.name, e
            ))
        })?;

        log::debug!("Registered tool '{}'", metadata.name);
        self.index.insert(metadata.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            metadata,
            schema,
            handler: tool,
        });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&RegisteredTool, AgentError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    /// Descriptors in registration order.
    pub fn describe_all(&self) -> Vec<ToolMetadata> {
        self.tools.iter().map(|t| t.metadata.clone()).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

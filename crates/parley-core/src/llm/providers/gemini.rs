//! Google Gemini API client implementation
//!
//! Talks to the native `generateContent` endpoint. Gemini correlates function
//! responses by function name rather than by call identifier, so tool results
//! are mapped back to the name of the call they answer before being sent.

use crate::config::LlmConfig;
use crate::core_types::{generate_call_id, LLMResponse, Message, Role, ToolCall, Usage};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Google Gemini API client
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.0,
            max_output_tokens: 4096,
            top_p: 1.0,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self.max_output_tokens = max_output_tokens;
        self
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "topP")]
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: Option<u32>,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetails {
    code: u16,
    message: String,
}

impl GeminiClient {
    fn convert_messages_to_gemini_contents(
        &self,
        messages: Vec<Message>,
    ) -> (Option<GeminiContent>, Vec<GeminiContent>) {
        let mut system_instruction = None;
        let mut contents: Vec<GeminiContent> = Vec::new();
        let mut call_names: HashMap<String, String> = HashMap::new();

        for message in messages {
            match message.role {
                Role::System => {
                    system_instruction = Some(GeminiContent {
                        role: None,
                        parts: vec![GeminiPart::Text {
                            text: message.content,
                        }],
                    });
                }
                Role::User => {
                    contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts: vec![GeminiPart::Text {
                            text: message.content,
                        }],
                    });
                }
                Role::Assistant => {
                    let mut parts = Vec::new();

                    if !message.content.is_empty() {
                        parts.push(GeminiPart::Text {
                            text: message.content.clone(),
                        });
                    }

                    for tool_call in message.pending_calls() {
                        call_names.insert(tool_call.id.clone(), tool_call.name.clone());
                        parts.push(GeminiPart::FunctionCall {
                            function_call: GeminiFunctionCall {
                                name: tool_call.name.clone(),
                                args: tool_call.arguments.clone(),
                            },
                        });
                    }

                    contents.push(GeminiContent {
                        role: Some("model".to_string()),
                        parts,
                    });
                }
                Role::Tool => {
                    let name = message
                        .tool_call_id
                        .as_ref()
                        .and_then(|id| call_names.get(id))
                        .cloned()
                        .unwrap_or_else(|| "unknown_tool".to_string());
                    let part = GeminiPart::FunctionResponse {
                        function_response: GeminiFunctionResponse {
                            name,
                            response: serde_json::json!({ "content": message.content }),
                        },
                    };

                    // Responses to one batch of calls belong in a single turn
                    match contents.last_mut() {
                        Some(last) if last.role.as_deref() == Some("function") => {
                            last.parts.push(part)
                        }
                        _ => contents.push(GeminiContent {
                            role: Some("function".to_string()),
                            parts: vec![part],
                        }),
                    }
                }
            }
        }

        (system_instruction, contents)
    }

    fn convert_tools_to_gemini(&self, tools: Vec<ToolMetadata>) -> Option<Vec<GeminiTool>> {
        if tools.is_empty() {
            return None;
        }

        let function_declarations = tools
            .into_iter()
            .map(|tool| GeminiFunctionDeclaration {
                name: tool.name,
                description: tool.description,
                parameters: strip_unsupported_schema_keys(tool.input_schema),
            })
            .collect();

        Some(vec![GeminiTool {
            function_declarations,
        }])
    }

    fn convert_gemini_response_to_llm(
        &self,
        response: GeminiResponse,
    ) -> Result<LLMResponse, AgentError> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            AgentError::ModelResponseInvalid("No candidates in Gemini response".to_string())
        })?;

        let mut content_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                GeminiPart::Text { text } => content_parts.push(text),
                GeminiPart::FunctionCall { function_call } => {
                    let arguments = if function_call.args.is_null() {
                        serde_json::json!({})
                    } else {
                        function_call.args
                    };
                    tool_calls.push(ToolCall::new(generate_call_id(), function_call.name, arguments));
                }
                GeminiPart::FunctionResponse { .. } => continue,
            }
        }

        let content = Some(content_parts.join(""))
            .filter(|text| !text.trim().is_empty());

        if content.is_none() && tool_calls.is_empty() {
            return Err(AgentError::ModelResponseInvalid(format!(
                "Gemini response has neither content nor tool calls (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count.unwrap_or(0),
            completion_tokens: u.candidates_token_count.unwrap_or(0),
            total_tokens: u.total_token_count.unwrap_or(0),
        });

        Ok(LLMResponse {
            content,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            finish_reason: candidate.finish_reason,
            usage,
        })
    }
}

/// Gemini accepts an OpenAPI subset of JSON Schema.
fn strip_unsupported_schema_keys(schema: Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| key != "additionalProperties" && key != "$schema")
                .map(|(key, value)| (key, strip_unsupported_schema_keys(value)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(strip_unsupported_schema_keys).collect())
        }
        other => other,
    }
}

#[async_trait]
impl LLM for GeminiClient {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        let (system_instruction, contents) = self.convert_messages_to_gemini_contents(messages);

        let request = GeminiRequest {
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                top_p: self.top_p,
            },
            system_instruction,
            tools: tools.and_then(|t| self.convert_tools_to_gemini(t)),
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        log::debug!("Gemini API request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::ModelUnavailable(format!("Gemini API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if let Ok(gemini_error) = serde_json::from_str::<GeminiError>(&error_text) {
                return Err(AgentError::ModelUnavailable(format!(
                    "Gemini API error {}: {}",
                    gemini_error.error.code, gemini_error.error.message
                )));
            }

            return Err(AgentError::ModelUnavailable(format!(
                "Gemini API request failed with status {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            AgentError::ModelResponseInvalid(format!("Failed to parse Gemini response: {}", e))
        })?;

        self.convert_gemini_response_to_llm(gemini_response)
    }
}

/// Create a Gemini LLM client from configuration
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    let api_key = match &config.auth.api_key {
        Some(key) => key.clone(),
        None => match &config.auth.api_key_env {
            Some(env_var) => env::var(env_var).map_err(|_| {
                AgentError::ConfigError(format!(
                    "Environment variable {} not found for Gemini API key",
                    env_var
                ))
            })?,
            None => {
                return Err(AgentError::ConfigError(
                    "No API key found for Gemini. Set GOOGLE_API_KEY or provide api_key in config"
                        .to_string(),
                ))
            }
        },
    };

    let http = Client::builder()
        .timeout(Duration::from_secs(config.parameters.timeout_seconds))
        .build()
        .map_err(|e| AgentError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

    let client = GeminiClient::new(api_key, config.model.clone())
        .with_http_client(http)
        .with_sampling(
            config.parameters.temperature,
            config.parameters.top_p,
            config.parameters.max_tokens,
        );

    Ok(Arc::new(client))
}

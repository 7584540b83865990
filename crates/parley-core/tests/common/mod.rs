#![allow(dead_code)]

use async_trait::async_trait;
use parley_core::core_types::{LLMResponse, Message, ToolCall};
use parley_core::errors::AgentError;
use parley_core::llm::{ToolMetadata, LLM};
use parley_core::tools::Tool;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// LLM that replays scripted responses and records every request.
pub struct ScriptedLLM {
    responses: Mutex<VecDeque<Result<LLMResponse, AgentError>>>,
    fallback: Option<Box<dyn Fn(usize) -> LLMResponse + Send + Sync>>,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLLM {
    pub fn new(responses: Vec<Result<LLMResponse, AgentError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `respond(request_index)`.
    pub fn always(respond: impl Fn(usize) -> LLMResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(Box::new(respond)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn generate(
        &self,
        messages: Vec<Message>,
        _tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages);
            requests.len() - 1
        };

        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(respond) => Ok(respond(index)),
            None => Err(AgentError::ModelUnavailable("script exhausted".to_string())),
        }
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

/// Tool that counts invocations and echoes its `text` argument.
#[derive(Default)]
pub struct CountingTool {
    pub invocations: AtomicUsize,
}

impl CountingTool {
    pub fn count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "echo".to_string(),
            description: "Echoes the given text".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String, AgentError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(format!("echo: {}", arguments["text"].as_str().unwrap_or_default()))
    }
}

/// Booking stand-in that records the booking and then cancels the
/// invocation, as a client disconnect would mid-run.
pub struct CancellingBookingTool {
    pub bookings: AtomicUsize,
    pub cancel: CancellationToken,
}

impl CancellingBookingTool {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            bookings: AtomicUsize::new(0),
            cancel,
        }
    }

    pub fn count(&self) -> usize {
        self.bookings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CancellingBookingTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: "book_interview".to_string(),
            description: "Books an interview".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<String, AgentError> {
        self.bookings.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Ok("Interview booked successfully.".to_string())
    }
}

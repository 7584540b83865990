use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::core_types::{Message, ToolCall};
use crate::errors::AgentError;
use crate::tools::ToolRegistry;

/// Outcome of one tool call, correlated to its request by call id.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: Result<String, AgentError>,
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The `tool` message carrying this result. Failures become a readable
    /// error description for the next reasoning step.
    pub fn into_message(self) -> Message {
        let content = match self.outcome {
            Ok(output) => output,
            Err(error) => format!(
                "Error executing tool '{}' (call {}): {}",
                self.tool_name, self.call_id, error
            ),
        };
        Message::tool_result(self.call_id, content)
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every call of one assistant turn concurrently. Exactly one result is
    /// returned per call, in request order.
    pub async fn execute(&self, calls: &[ToolCall]) -> Vec<ToolCallResult> {
        join_all(calls.iter().map(|call| async move {
            let outcome = self.execute_one(call).await;
            match &outcome {
                Ok(_) => log::info!("Tool '{}' ({}) succeeded", call.name, call.id),
                Err(e) => log::warn!("Tool '{}' ({}) failed: {}", call.name, call.id, e),
            }
            ToolCallResult {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                outcome,
            }
        }))
        .await
    }

    async fn execute_one(&self, call: &ToolCall) -> Result<String, AgentError> {
        let tool = self.registry.resolve(&call.name)?;
        tool.validate_arguments(&call.arguments)?;

        log::info!("Executing tool '{}' with arguments: {}", call.name, call.arguments);
        let handler = tool.handler();
        let execution = AssertUnwindSafe(handler.execute(call.arguments.clone()))
            .catch_unwind()
            .map(|result| {
                result.unwrap_or_else(|panic| {
                    Err(AgentError::ToolError {
                        tool_name: call.name.clone(),
                        message: format!("handler panicked: {}", panic_message(panic.as_ref())),
                    })
                })
            });

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| AgentError::ToolError {
                    tool_name: call.name.clone(),
                    message: format!("timed out after {}s", limit.as_secs_f64()),
                })?,
            None => execution.await,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

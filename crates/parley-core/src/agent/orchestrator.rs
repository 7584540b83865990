use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::executor::ToolExecutor;
use crate::agent::reasoning::ReasoningStep;
use crate::agent::AgentConfig;
use crate::core_types::{Message, Role};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Reasoning,
    ExecutingTools,
    Done,
}

/// Why a loop run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    FinalAnswer,
    Degraded,
    CycleLimit,
    Cancelled,
}

/// Everything one loop run produced.
#[derive(Debug, Clone)]
pub struct LoopRun {
    /// Messages appended since entry, in order.
    pub new_messages: Vec<Message>,
    /// Completed reasoning to tool-execution round-trips.
    pub cycles: usize,
    pub termination: Termination,
}

impl LoopRun {
    /// Text of the closing assistant message.
    pub fn final_text(&self) -> Option<&str> {
        self.new_messages
            .last()
            .filter(|m| m.role == Role::Assistant && !m.has_tool_calls())
            .map(|m| m.content.as_str())
    }
}

pub struct Orchestrator {
    reasoning: ReasoningStep,
    executor: ToolExecutor,
    tools: Vec<ToolMetadata>,
    max_cycles: usize,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LLM>,
        registry: Arc<ToolRegistry>,
        config: &AgentConfig,
    ) -> Result<Self, AgentError> {
        if config.max_cycles == 0 {
            return Err(AgentError::Orchestration(
                "cycle guard misconfigured: max_cycles must be positive".to_string(),
            ));
        }

        Ok(Self {
            reasoning: ReasoningStep::new(llm),
            tools: registry.describe_all(),
            executor: ToolExecutor::new(registry).with_timeout(config.tool_timeout),
            max_cycles: config.max_cycles,
        })
    }

    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }

    /// Drive the state machine over `context` (system prompt, history and the
    /// new user turn) until it reaches `Done`.
    ///
    /// The token is checked before every phase. A cancelled run still returns
    /// what it produced so far, tagged `Termination::Cancelled`; tool calls
    /// that had already started are allowed to finish. Any call left pending
    /// is answered as not executed and a closing assistant message is added,
    /// so the produced turns stay well formed.
    pub async fn run(
        &self,
        context: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<LoopRun, AgentError> {
        let entry_len = context.len();
        let mut working = context;
        let mut state = LoopState::Reasoning;
        let mut termination = Termination::FinalAnswer;
        let mut cycles = 0;

        while state != LoopState::Done {
            if cancel.is_cancelled() {
                log::warn!("Loop run cancelled after {} cycle(s)", cycles);
                termination = Termination::Cancelled;
                break;
            }

            state = match state {
                LoopState::Reasoning => {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            log::warn!("Loop run cancelled during reasoning");
                            termination = Termination::Cancelled;
                            break;
                        }
                        outcome = self.reasoning.run(&working, &self.tools) => outcome,
                    };

                    let degraded = outcome.is_degraded();
                    let message = outcome.into_message();
                    let requests_tools = message.has_tool_calls();
                    append(&mut working, message)?;

                    if degraded {
                        termination = Termination::Degraded;
                        LoopState::Done
                    } else if !requests_tools {
                        termination = Termination::FinalAnswer;
                        LoopState::Done
                    } else if cycles >= self.max_cycles {
                        log::warn!(
                            "Cycle guard tripped after {} round-trips; forcing a final answer",
                            cycles
                        );
                        self.close_at_cycle_limit(&mut working)?;
                        termination = Termination::CycleLimit;
                        LoopState::Done
                    } else {
                        LoopState::ExecutingTools
                    }
                }
                LoopState::ExecutingTools => {
                    let calls = working
                        .last()
                        .map(|m| m.pending_calls().to_vec())
                        .filter(|calls| !calls.is_empty())
                        .ok_or_else(|| {
                            AgentError::Orchestration(
                                "entered tool execution without pending tool calls".to_string(),
                            )
                        })?;

                    cycles += 1;
                    log::info!("Cycle {}: executing {} tool call(s)", cycles, calls.len());
                    for result in self.executor.execute(&calls).await {
                        append(&mut working, result.into_message())?;
                    }
                    LoopState::Reasoning
                }
                LoopState::Done => LoopState::Done,
            };
        }

        if termination == Termination::Cancelled && working.len() > entry_len {
            close_unfinished(
                &mut working,
                "the request was cancelled",
                "This request was cancelled before I could finish it. \
                 Any action reported above has already been carried out.",
            )?;
        }

        let new_messages = working.split_off(entry_len);
        log::info!(
            "Loop run finished: {:?} after {} cycle(s), {} new message(s)",
            termination,
            cycles,
            new_messages.len()
        );

        Ok(LoopRun {
            new_messages,
            cycles,
            termination,
        })
    }

    fn close_at_cycle_limit(&self, working: &mut Vec<Message>) -> Result<(), AgentError> {
        close_unfinished(
            working,
            &format!("the limit of {} tool round-trips was reached", self.max_cycles),
            &format!(
                "I couldn't finish this request within the allowed {} tool round-trips. \
                 Please try rephrasing it or splitting it into smaller questions.",
                self.max_cycles
            ),
        )
    }
}

/// Answer every call of the last assistant turn with a "not executed"
/// result, then add the closing assistant message.
fn close_unfinished(working: &mut Vec<Message>, reason: &str, closing: &str) -> Result<(), AgentError> {
    let pending = match working.last() {
        Some(last) if last.role == Role::Assistant => last.pending_calls().to_vec(),
        _ => Vec::new(),
    };

    for call in pending {
        append(
            working,
            Message::tool_result(
                call.id,
                format!("Tool '{}' was not executed: {}.", call.name, reason),
            ),
        )?;
    }

    append(working, Message::assistant(closing))
}

/// Append `message`, keeping tool results attached to the assistant turn
/// that requested them.
fn append(working: &mut Vec<Message>, message: Message) -> Result<(), AgentError> {
    let open_turn = working.iter().rposition(|m| m.role == Role::Assistant);
    let (requested, answered): (Vec<&str>, Vec<&str>) = match open_turn {
        Some(idx) => {
            let requested = working[idx].pending_calls().iter().map(|c| c.id.as_str()).collect();
            let answered = working[idx + 1..]
                .iter()
                .filter_map(|m| m.tool_call_id.as_deref())
                .collect();
            (requested, answered)
        }
        None => (Vec::new(), Vec::new()),
    };
    let unanswered = requested.iter().filter(|id| !answered.contains(*id)).count();

    match message.role {
        Role::Tool => {
            let id = message.tool_call_id.as_deref().unwrap_or_default();
            if !requested.contains(&id) || answered.contains(&id) {
                return Err(AgentError::Orchestration(format!(
                    "tool result '{}' does not answer a pending tool call",
                    id
                )));
            }
        }
        _ if unanswered > 0 => {
            return Err(AgentError::Orchestration(format!(
                "{} tool call(s) left unanswered before the next {} message",
                unanswered,
                message.role.as_str()
            )));
        }
        _ => {}
    }

    working.push(message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ToolCall;
    use serde_json::json;

    #[test]
    fn test_append_accepts_matching_results() {
        let mut working = vec![Message::user("hi")];
        append(
            &mut working,
            Message::assistant_with_calls(
                "",
                vec![
                    ToolCall::new("a", "t", json!({})),
                    ToolCall::new("b", "t", json!({})),
                ],
            ),
        )
        .unwrap();
        append(&mut working, Message::tool_result("b", "2")).unwrap();
        append(&mut working, Message::tool_result("a", "1")).unwrap();
        append(&mut working, Message::assistant("done")).unwrap();
        assert_eq!(working.len(), 5);
    }

    #[test]
    fn test_append_rejects_stray_tool_result() {
        let mut working = vec![Message::user("hi")];
        let err = append(&mut working, Message::tool_result("x", "?")).unwrap_err();
        assert!(matches!(err, AgentError::Orchestration(_)));
    }

    #[test]
    fn test_append_rejects_duplicate_result() {
        let mut working = vec![Message::assistant_with_calls(
            "",
            vec![ToolCall::new("a", "t", json!({}))],
        )];
        append(&mut working, Message::tool_result("a", "1")).unwrap();
        assert!(append(&mut working, Message::tool_result("a", "1")).is_err());
    }

    #[test]
    fn test_append_rejects_skipping_results() {
        let mut working = vec![Message::assistant_with_calls(
            "",
            vec![ToolCall::new("a", "t", json!({}))],
        )];
        assert!(append(&mut working, Message::assistant("done")).is_err());
    }

    #[test]
    fn test_final_text_ignores_tool_requests() {
        let run = LoopRun {
            new_messages: vec![Message::assistant_with_calls(
                "thinking",
                vec![ToolCall::new("a", "t", json!({}))],
            )],
            cycles: 0,
            termination: Termination::Cancelled,
        };
        assert_eq!(run.final_text(), None);
    }
}

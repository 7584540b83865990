mod common;

use common::{call, CancellingBookingTool, CountingTool, ScriptedLLM};
use parley_core::agent::{AgentConfig, Orchestrator, Termination, DEGRADED_REPLY};
use parley_core::core_types::{LLMResponse, Message, Role};
use parley_core::errors::AgentError;
use parley_core::tools::ToolRegistry;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn registry_with(tool: Arc<CountingTool>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(tool).unwrap();
    Arc::new(registry)
}

fn config(max_cycles: usize) -> AgentConfig {
    AgentConfig {
        max_cycles,
        ..AgentConfig::default()
    }
}

fn context(text: &str) -> Vec<Message> {
    vec![Message::system("You are a test assistant."), Message::user(text)]
}

#[tokio::test]
async fn direct_answer_takes_one_reasoning_visit() {
    let llm = ScriptedLLM::new(vec![Ok(LLMResponse::text("Hello there!"))]);
    let tool = Arc::new(CountingTool::default());
    let orchestrator = Orchestrator::new(llm.clone(), registry_with(tool.clone()), &config(5)).unwrap();

    let run = orchestrator
        .run(context("hi"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(run.cycles, 0);
    assert_eq!(run.termination, Termination::FinalAnswer);
    assert_eq!(run.new_messages, vec![Message::assistant("Hello there!")]);
    assert_eq!(tool.count(), 0);
}

#[tokio::test]
async fn cycle_guard_bounds_a_model_that_never_stops() {
    let llm = ScriptedLLM::always(|i| {
        LLMResponse::calls(vec![call(&format!("call_{}", i), "echo", json!({"text": "again"}))])
    });
    let tool = Arc::new(CountingTool::default());
    let orchestrator = Orchestrator::new(llm.clone(), registry_with(tool.clone()), &config(3)).unwrap();

    let run = orchestrator
        .run(context("loop forever"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::CycleLimit);
    assert_eq!(run.cycles, 3);
    assert_eq!(tool.count(), 3);
    assert_eq!(llm.calls(), 4);

    // The unexecuted request is still answered so the history stays well formed
    let n = run.new_messages.len();
    assert_eq!(run.new_messages[n - 2].role, Role::Tool);
    assert_eq!(run.new_messages[n - 2].tool_call_id.as_deref(), Some("call_3"));
    assert!(run.new_messages[n - 2].content.contains("not executed"));
    assert!(run.final_text().unwrap().contains("3 tool round-trips"));
}

#[tokio::test]
async fn model_driven_cycles_below_the_limit() {
    let llm = ScriptedLLM::new(vec![
        Ok(LLMResponse::calls(vec![call("a", "echo", json!({"text": "1"}))])),
        Ok(LLMResponse::calls(vec![call("b", "echo", json!({"text": "2"}))])),
        Ok(LLMResponse::text("done")),
    ]);
    let tool = Arc::new(CountingTool::default());
    let orchestrator = Orchestrator::new(llm.clone(), registry_with(tool.clone()), &config(5)).unwrap();

    let run = orchestrator
        .run(context("go"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.cycles, 2);
    assert_eq!(run.termination, Termination::FinalAnswer);
    assert_eq!(run.final_text(), Some("done"));
}

#[tokio::test]
async fn batch_of_calls_yields_one_result_each() {
    let batch = vec![
        call("c1", "echo", json!({"text": "one"})),
        call("c2", "nonexistent", json!({})),
        call("c3", "echo", json!({"wrong": true})),
        call("c4", "echo", json!({"text": "four"})),
    ];
    let llm = ScriptedLLM::new(vec![
        Ok(LLMResponse::calls(batch)),
        Ok(LLMResponse::text("summary")),
    ]);
    let tool = Arc::new(CountingTool::default());
    let orchestrator = Orchestrator::new(llm.clone(), registry_with(tool.clone()), &config(5)).unwrap();

    let run = orchestrator
        .run(context("batch"), &CancellationToken::new())
        .await
        .unwrap();

    let results: Vec<&Message> = run.new_messages.iter().filter(|m| m.role == Role::Tool).collect();
    let ids: Vec<&str> = results.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    assert_eq!(results[0].content, "echo: one");
    assert!(results[1].content.contains("Unknown tool: nonexistent"));
    assert!(results[2].content.contains("Invalid arguments for tool 'echo'"));
    assert_eq!(results[3].content, "echo: four");
    assert_eq!(tool.count(), 2);
}

#[tokio::test]
async fn unknown_tool_error_is_visible_to_the_next_reasoning_step() {
    let llm = ScriptedLLM::new(vec![
        Ok(LLMResponse::calls(vec![call("stale_1", "search_web", json!({"q": "x"}))])),
        Ok(LLMResponse::text("Sorry, I can't search the web.")),
    ]);
    let orchestrator = Orchestrator::new(
        llm.clone(),
        registry_with(Arc::new(CountingTool::default())),
        &config(5),
    )
    .unwrap();

    let run = orchestrator
        .run(context("search the web"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::FinalAnswer);
    let second_request = llm.request(1);
    let last = second_request.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.tool_call_id.as_deref(), Some("stale_1"));
    assert!(last.content.contains("Unknown tool: search_web"));
}

#[tokio::test]
async fn model_failure_mid_run_ends_gracefully() {
    let llm = ScriptedLLM::new(vec![
        Ok(LLMResponse::calls(vec![call("a", "echo", json!({"text": "1"}))])),
        Err(AgentError::ModelResponseInvalid("garbled".to_string())),
    ]);
    let orchestrator = Orchestrator::new(
        llm,
        registry_with(Arc::new(CountingTool::default())),
        &config(5),
    )
    .unwrap();

    let run = orchestrator
        .run(context("go"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.termination, Termination::Degraded);
    assert_eq!(run.final_text(), Some(DEGRADED_REPLY));
}

#[tokio::test]
async fn zero_cycle_guard_is_rejected() {
    let llm = ScriptedLLM::new(vec![]);
    let result = Orchestrator::new(
        llm,
        registry_with(Arc::new(CountingTool::default())),
        &config(0),
    );
    assert!(matches!(result, Err(AgentError::Orchestration(_))));
}

#[tokio::test]
async fn cancelled_token_stops_before_reasoning() {
    let llm = ScriptedLLM::new(vec![Ok(LLMResponse::text("never"))]);
    let orchestrator = Orchestrator::new(
        llm.clone(),
        registry_with(Arc::new(CountingTool::default())),
        &config(5),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let run = orchestrator.run(context("hi"), &cancel).await.unwrap();

    assert_eq!(run.termination, Termination::Cancelled);
    assert!(run.new_messages.is_empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn cancellation_during_tools_closes_the_run() {
    let cancel = CancellationToken::new();
    let booking = Arc::new(CancellingBookingTool::new(cancel.clone()));
    let mut registry = ToolRegistry::new();
    registry.register(booking.clone()).unwrap();

    let llm = ScriptedLLM::new(vec![Ok(LLMResponse::calls(vec![call(
        "call_1",
        "book_interview",
        json!({}),
    )]))]);
    let orchestrator = Orchestrator::new(llm.clone(), Arc::new(registry), &config(5)).unwrap();

    let run = orchestrator.run(context("book it"), &cancel).await.unwrap();

    assert_eq!(run.termination, Termination::Cancelled);
    assert_eq!(run.cycles, 1);
    assert_eq!(booking.count(), 1);
    assert_eq!(llm.calls(), 1);
    let roles: Vec<Role> = run.new_messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::Tool, Role::Assistant]);
    assert!(run.final_text().unwrap().contains("cancelled"));
}

//! Tests for the turn engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::chat::{ChatMessage, ChatRole, ContentBlock};
use crate::error::EngineError;
use crate::mock::{MockError, MockUpstream};
use crate::test_helpers::{
    collect_events, content, event_types, finish_stop, finish_tool_calls, reasoning, sample_registry,
    text_round, tool_args, tool_round, tool_start,
};
use crate::tool::{ToolError, ToolRegistry, tool_fn};
use crate::upstream::ToolDefinition;

fn user_request() -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user("What's up?")],
        ..Default::default()
    }
}

async fn drive(
    mock: &MockUpstream,
    tools: &dyn ToolExecutor,
    config: &EngineConfig,
) -> (Vec<ClientEvent>, TurnOutcome) {
    let (tx, rx) = mpsc::channel(256);
    let outcome = run_turn(mock, tools, user_request(), config, tx, CancellationToken::new()).await;
    (collect_events(rx).await, outcome)
}

fn counting_tool(name: &'static str, counter: Arc<AtomicUsize>) -> impl crate::tool::ToolHandler + 'static {
    tool_fn(
        ToolDefinition::new(name, "Counts invocations", json!({"type": "object"})),
        move |input: Value| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(input)
            }
        },
    )
}

fn hanging_tool(name: &'static str) -> impl crate::tool::ToolHandler + 'static {
    tool_fn(
        ToolDefinition::new(name, "Never returns", json!({"type": "object"})),
        |_input: Value| async move {
            std::future::pending::<()>().await;
            Ok("unreachable")
        },
    )
}

// ── Happy paths ─────────────────────────────────────────────────

#[tokio::test]
async fn test_plain_answer_emits_single_done() {
    let mock = MockUpstream::new();
    mock.queue_stream(vec![content("Hel"), content("lo"), finish_stop()]);

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(event_types(&events), ["content", "content", "done"]);
    assert_eq!(events.last(), Some(&ClientEvent::Done { rounds: 1 }));
    assert!(outcome.is_completed());
    assert_eq!(outcome.content, "Hello");
    assert_eq!(outcome.rounds, 1);
    assert_eq!(outcome.tool_calls, 0);
    assert_eq!(outcome.transcript.len(), 1);
}

#[tokio::test]
async fn test_registry_definitions_are_advertised() {
    let mock = MockUpstream::new();
    mock.queue_stream(text_round("ok"));

    drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    let calls = mock.recorded_calls();
    let names: Vec<_> = calls[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["echo", "empty", "fail"]);
}

#[tokio::test]
async fn test_caller_tools_are_kept() {
    let mock = MockUpstream::new();
    mock.queue_stream(text_round("ok"));
    let request = ChatRequest {
        tools: vec![ToolDefinition::new("echo", "Only this one", json!({}))],
        ..user_request()
    };
    let (tx, _rx) = mpsc::channel(16);

    run_turn(
        &mock,
        &sample_registry(),
        request,
        &EngineConfig::default(),
        tx,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(mock.recorded_calls()[0].tools.len(), 1);
}

#[tokio::test]
async fn test_single_tool_call_round_trip() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut tools = ToolRegistry::new();
    tools.register(counting_tool("lookup", Arc::clone(&counter)));

    let mock = MockUpstream::new();
    let mut first = vec![content("Let me check.")];
    first.extend(tool_round(0, "call_1", "lookup", r#"{"q": "rust"}"#));
    mock.queue_stream(first);
    mock.queue_stream(text_round("Found it."));

    let (events, outcome) = drive(&mock, &tools, &EngineConfig::default()).await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(
        event_types(&events),
        [
            "content",
            "tool_call_progress",
            "tool_call_progress",
            "tool_call_progress",
            "tool_call",
            "tool_result",
            "content",
            "done"
        ]
    );
    assert_eq!(
        events[4],
        ClientEvent::ToolCall {
            index: 0,
            id: "call_1".into(),
            name: "lookup".into(),
            arguments: json!({"q": "rust"}),
        }
    );
    assert!(matches!(
        &events[5],
        ClientEvent::ToolResult { result, .. } if result == "{\n  \"q\": \"rust\"\n}"
    ));
    assert_eq!(events[7], ClientEvent::Done { rounds: 2 });
    assert_eq!(outcome.content, "Let me check.Found it.");

    // Second round sees the extended transcript.
    let calls = mock.recorded_calls();
    assert_eq!(calls.len(), 2);
    let transcript = &calls[1].messages;
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1].role, ChatRole::Assistant);
    assert_eq!(transcript[1].text_content().as_deref(), Some("Let me check."));
    assert_eq!(transcript[1].tool_calls().count(), 1);
    assert_eq!(transcript[2].role, ChatRole::Tool);
    let result = transcript[2].tool_result_block().unwrap();
    assert_eq!(result.tool_call_id, "call_1");
    assert!(!result.is_error);
    assert_eq!(outcome.transcript, *transcript);
}

#[tokio::test]
async fn test_two_calls_execute_in_index_order() {
    let mock = MockUpstream::new();
    mock.queue_stream(vec![
        tool_start(1, "call_b", "echo"),
        tool_start(0, "call_a", "echo"),
        tool_args(1, r#"{"n": 1}"#),
        tool_args(0, r#"{"n": 0}"#),
        finish_tool_calls(),
    ]);
    mock.queue_stream(text_round("Both done."));

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    let tool_events: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::ToolCall { index, .. } => Some(("tool_call", *index)),
            ClientEvent::ToolResult { index, .. } => Some(("tool_result", *index)),
            _ => None,
        })
        .collect();
    assert_eq!(
        tool_events,
        [
            ("tool_call", 0),
            ("tool_result", 0),
            ("tool_call", 1),
            ("tool_result", 1)
        ]
    );
    assert_eq!(outcome.tool_calls, 2);

    let calls = mock.recorded_calls();
    let transcript = &calls[1].messages;
    let roles: Vec<_> = transcript.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::Tool,
            ChatRole::Assistant,
            ChatRole::Tool
        ]
    );
    assert_eq!(transcript[2].tool_result_block().unwrap().tool_call_id, "call_a");
    assert_eq!(transcript[4].tool_result_block().unwrap().tool_call_id, "call_b");
}

#[tokio::test]
async fn test_tool_calls_run_sequentially() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut tools = ToolRegistry::new();
    {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        tools.register(tool_fn(
            ToolDefinition::new("slow", "Yields while running", json!({"type": "object"})),
            move |_input: Value| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok("done")
                }
            },
        ));
    }

    let mock = MockUpstream::new();
    let mut first = tool_round(0, "a", "slow", "{}");
    first.pop();
    first.extend(tool_round(1, "b", "slow", "{}"));
    mock.queue_stream(first);
    mock.queue_stream(text_round("ok"));

    let (_events, outcome) = drive(&mock, &tools, &EngineConfig::default()).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.tool_calls, 2);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reasoning_is_forwarded() {
    let mock = MockUpstream::new();
    mock.queue_stream(vec![
        reasoning("thinking"),
        content("answer"),
        finish_stop(),
    ]);

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(event_types(&events), ["reasoning", "content", "done"]);
    assert_eq!(outcome.content, "answer");
}

#[tokio::test]
async fn test_stream_without_finish_is_implicit_finish() {
    let mock = MockUpstream::new();
    mock.queue_stream(vec![content("cut short")]);

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(event_types(&events), ["content", "done"]);
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_pending_calls_without_finish_still_execute() {
    let mock = MockUpstream::new();
    let mut first = tool_round(0, "call_1", "echo", r#"{"x": true}"#);
    first.pop();
    mock.queue_stream(first);
    mock.queue_stream(text_round("ok"));

    let (events, _outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert!(event_types(&events).contains(&"tool_result"));
    assert_eq!(mock.recorded_calls().len(), 2);
}

// ── Recoverable failures ────────────────────────────────────────

#[tokio::test]
async fn test_name_without_arguments_yields_tool_error() {
    let mock = MockUpstream::new();
    mock.queue_stream(vec![tool_start(0, "call_1", "echo"), finish_tool_calls()]);

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(event_types(&events), ["tool_call_progress", "tool_error", "done"]);
    assert!(matches!(
        &events[1],
        ClientEvent::ToolError { index: 0, name: Some(name), message, .. }
            if name == "echo" && message.contains("empty arguments")
    ));
    assert!(outcome.is_completed());
    assert_eq!(outcome.tool_calls, 0);
    assert_eq!(mock.recorded_calls().len(), 1);
}

#[tokio::test]
async fn test_malformed_call_does_not_block_valid_sibling() {
    let mock = MockUpstream::new();
    mock.queue_stream(vec![
        tool_args(0, "{}"),
        tool_start(1, "call_ok", "echo"),
        tool_args(1, r#"{"fine": 1}"#),
        finish_tool_calls(),
    ]);
    mock.queue_stream(text_round("ok"));

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    let terminal: Vec<_> = event_types(&events)
        .into_iter()
        .filter(|t| *t != "tool_call_progress")
        .collect();
    assert_eq!(
        terminal,
        ["tool_error", "tool_call", "tool_result", "content", "done"]
    );
    assert!(matches!(
        &events[3],
        ClientEvent::ToolError { index: 0, id, name: None, .. } if id == "call_0"
    ));
    assert_eq!(outcome.tool_calls, 1);
}

#[tokio::test]
async fn test_failing_tool_is_recorded_and_turn_continues() {
    let mock = MockUpstream::new();
    mock.queue_stream(tool_round(0, "call_1", "fail", "{}"));
    mock.queue_stream(text_round("Sorry, the backend is down."));

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::ToolError { message, .. } if message == "backend unavailable"
    )));
    assert_eq!(events.last(), Some(&ClientEvent::Done { rounds: 2 }));
    let result = outcome.transcript[2].tool_result_block().unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "Tool execution failed: backend unavailable");
}

#[tokio::test]
async fn test_empty_result_is_tool_error() {
    let mock = MockUpstream::new();
    mock.queue_stream(tool_round(0, "call_1", "empty", "{}"));
    mock.queue_stream(text_round("ok"));

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert!(!event_types(&events).contains(&"tool_result"));
    assert!(event_types(&events).contains(&"tool_error"));
    assert!(outcome.transcript[2].tool_result_block().unwrap().is_error);
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_unknown_tool_is_tool_error() {
    let mock = MockUpstream::new();
    mock.queue_stream(tool_round(0, "call_1", "nonexistent", "{}"));
    mock.queue_stream(text_round("ok"));

    let (events, _outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::ToolError { message, .. } if message == "Unknown tool: nonexistent"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_tool_timeout_is_tool_error() {
    let mut tools = ToolRegistry::new();
    tools.register(hanging_tool("stuck"));
    let mock = MockUpstream::new();
    mock.queue_stream(tool_round(0, "call_1", "stuck", "{}"));
    mock.queue_stream(text_round("moving on"));
    let config = EngineConfig {
        tool_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };

    let (events, outcome) = drive(&mock, &tools, &config).await;

    assert!(events.iter().any(|e| matches!(
        e,
        ClientEvent::ToolError { message, .. } if message.contains("timed out after 50ms")
    )));
    assert!(outcome.is_completed());
}

// ── Fatal failures ──────────────────────────────────────────────

#[tokio::test]
async fn test_rate_limited_before_any_frame() {
    let mock = MockUpstream::new();
    mock.queue_stream_error(MockError::RateLimited("try later".into()));

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ClientEvent::Error { kind, .. } if kind == "rate_limited"
    ));
    assert!(matches!(outcome.error(), Some(EngineError::RateLimited(_))));
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_streamed_content() {
    let mock = MockUpstream::new();
    mock.queue_stream_failing(
        vec![content("partial ")],
        MockError::Http {
            status: None,
            message: "connection reset".into(),
            retryable: true,
        },
    );

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(event_types(&events), ["content", "error"]);
    assert_eq!(outcome.content, "partial ");
    assert!(outcome.error().unwrap().is_retryable());
}

#[tokio::test]
async fn test_failure_in_follow_up_round() {
    let mock = MockUpstream::new();
    mock.queue_stream(tool_round(0, "call_1", "echo", "{}"));
    mock.queue_stream_error(MockError::Timeout { elapsed_ms: 60_000 });

    let (events, outcome) = drive(&mock, &sample_registry(), &EngineConfig::default()).await;

    assert_eq!(events.last().map(ClientEvent::event_type), Some("error"));
    assert!(!event_types(&events).contains(&"done"));
    assert_eq!(outcome.rounds, 2);
}

#[tokio::test]
async fn test_max_rounds_exceeded() {
    let mock = MockUpstream::new();
    mock.queue_stream(tool_round(0, "c1", "echo", "{}"));
    mock.queue_stream(tool_round(0, "c2", "echo", "{}"));
    let config = EngineConfig {
        max_rounds: Some(2),
        ..Default::default()
    };

    let (events, outcome) = drive(&mock, &sample_registry(), &config).await;

    assert_eq!(mock.recorded_calls().len(), 2);
    assert!(matches!(
        events.last(),
        Some(ClientEvent::Error { kind, .. }) if kind == "max_rounds_exceeded"
    ));
    assert!(matches!(
        outcome.error(),
        Some(EngineError::MaxRoundsExceeded { limit: 2 })
    ));
}

#[tokio::test]
async fn test_unbounded_rounds() {
    let mock = MockUpstream::new();
    for i in 0..12 {
        mock.queue_stream(tool_round(0, &format!("c{i}"), "echo", "{}"));
    }
    mock.queue_stream(text_round("finally"));
    let config = EngineConfig {
        max_rounds: None,
        ..Default::default()
    };

    let (events, outcome) = drive(&mock, &sample_registry(), &config).await;

    assert_eq!(events.last(), Some(&ClientEvent::Done { rounds: 13 }));
    assert_eq!(outcome.tool_calls, 12);
    assert_eq!(mock.remaining(), 0);
}

// ── Cancellation ────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_token_stops_hanging_stream() {
    let mock = Arc::new(MockUpstream::new());
    mock.queue_stream_hanging(vec![content("streaming...")]);
    let cancel = CancellationToken::new();

    let (mut rx, handle) = spawn_turn(
        mock.clone(),
        Arc::new(sample_registry()),
        user_request(),
        EngineConfig::default(),
        cancel.clone(),
    );
    assert!(matches!(rx.recv().await, Some(ClientEvent::Content { .. })));

    cancel.cancel();
    let outcome = handle.await.unwrap();

    assert!(matches!(outcome.status, TurnStatus::Cancelled));
    assert!(rx.recv().await.is_none());
    assert_eq!(mock.released_streams(), 1);
}

#[tokio::test]
async fn test_consumer_drop_cancels_turn() {
    let mock = Arc::new(MockUpstream::new());
    mock.queue_stream_hanging(vec![content("streaming...")]);

    let (mut rx, handle) = spawn_turn(
        mock.clone(),
        Arc::new(sample_registry()),
        user_request(),
        EngineConfig::default(),
        CancellationToken::new(),
    );
    assert!(rx.recv().await.is_some());
    drop(rx);

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome.status, TurnStatus::Cancelled));
    assert_eq!(mock.released_streams(), 1);
}

#[tokio::test]
async fn test_in_flight_tool_is_abandoned_on_cancel() {
    let mut tools = ToolRegistry::new();
    tools.register(hanging_tool("stuck"));
    let mock = Arc::new(MockUpstream::new());
    mock.queue_stream(tool_round(0, "call_1", "stuck", "{}"));
    let cancel = CancellationToken::new();

    let (mut rx, handle) = spawn_turn(
        mock.clone(),
        Arc::new(tools),
        user_request(),
        EngineConfig::default(),
        cancel.clone(),
    );
    while let Some(event) = rx.recv().await {
        if matches!(event, ClientEvent::ToolCall { .. }) {
            break;
        }
    }
    cancel.cancel();

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome.status, TurnStatus::Cancelled));
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(outcome.transcript.len(), 1);
    assert_eq!(mock.recorded_calls().len(), 1);
}

#[tokio::test]
async fn test_cancel_skips_remaining_tools() {
    let cancel = CancellationToken::new();
    let second = Arc::new(AtomicUsize::new(0));
    let mut tools = ToolRegistry::new();
    {
        let cancel = cancel.clone();
        tools.register(tool_fn(
            ToolDefinition::new("first", "Cancels the turn", json!({"type": "object"})),
            move |_input: Value| {
                let cancel = cancel.clone();
                async move {
                    cancel.cancel();
                    Ok("ok")
                }
            },
        ));
    }
    tools.register(counting_tool("second", Arc::clone(&second)));

    let mock = MockUpstream::new();
    let mut round = tool_round(0, "a", "first", "{}");
    round.pop();
    round.extend(tool_round(1, "b", "second", "{}"));
    mock.queue_stream(round);

    let (tx, rx) = mpsc::channel(256);
    let outcome = run_turn(
        &mock,
        &tools,
        user_request(),
        &EngineConfig::default(),
        tx,
        cancel,
    )
    .await;
    let events = collect_events(rx).await;

    assert!(matches!(outcome.status, TurnStatus::Cancelled));
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert!(!event_types(&events).contains(&"done"));
}

// ── Stream entry point ──────────────────────────────────────────

#[tokio::test]
async fn test_turn_stream_yields_ordered_events() {
    use futures::StreamExt;

    let mock = Arc::new(MockUpstream::new());
    mock.queue_stream(tool_round(0, "call_1", "echo", r#"{"k": "v"}"#));
    mock.queue_stream(text_round("done"));

    let events: Vec<_> = turn_stream(
        mock,
        Arc::new(sample_registry()),
        user_request(),
        EngineConfig {
            event_buffer: 1,
            ..Default::default()
        },
        CancellationToken::new(),
    )
    .collect()
    .await;

    let types = event_types(&events);
    assert_eq!(types.first(), Some(&"tool_call_progress"));
    assert_eq!(types.last(), Some(&"done"));
    let call_pos = types.iter().position(|t| *t == "tool_call").unwrap();
    let result_pos = types.iter().position(|t| *t == "tool_result").unwrap();
    assert!(call_pos < result_pos);
}

#[test]
fn test_transcript_blocks_for_tool_round() {
    let msg = ChatMessage::assistant_tool_calls(
        None,
        vec![crate::chat::ToolCall {
            id: "x".into(),
            name: "echo".into(),
            arguments: json!({}),
        }],
    );
    assert!(matches!(msg.content[0], ContentBlock::ToolCall(_)));
}

#[test]
fn test_tool_error_into_transcript_text() {
    let err = ToolError::new("disk full");
    let result = crate::chat::ToolResult::failure("id", &err);
    assert_eq!(result.content, "Tool execution failed: disk full");
}

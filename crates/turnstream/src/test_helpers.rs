//! Shorthands for scripting rounds and collecting events in tests.
//!
//! Available with the `test-utils` feature so downstream crates can reuse
//! them. Also compiled during `#[cfg(test)]` for this crate's own tests.

use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::delta::{Delta, FinishReason, ToolCallDelta};
use crate::event::ClientEvent;
use crate::tool::{ToolError, ToolRegistry, tool_fn};
use crate::upstream::ToolDefinition;

/// Shorthand for [`Delta::Content`].
pub fn content(text: &str) -> Delta {
    Delta::Content(text.into())
}

/// Shorthand for [`Delta::Reasoning`].
pub fn reasoning(text: &str) -> Delta {
    Delta::Reasoning(text.into())
}

/// A finish signal with [`FinishReason::Stop`].
pub fn finish_stop() -> Delta {
    Delta::Finish {
        reason: FinishReason::Stop,
    }
}

/// A finish signal with [`FinishReason::ToolCalls`].
pub fn finish_tool_calls() -> Delta {
    Delta::Finish {
        reason: FinishReason::ToolCalls,
    }
}

/// The opening fragment of a tool call: id and name, no arguments.
pub fn tool_start(index: u32, id: &str, name: &str) -> Delta {
    Delta::ToolCall(ToolCallDelta {
        index,
        id: Some(id.into()),
        name: Some(name.into()),
        arguments: None,
    })
}

/// An arguments-only fragment of a tool call.
pub fn tool_args(index: u32, fragment: &str) -> Delta {
    Delta::ToolCall(ToolCallDelta {
        index,
        id: None,
        name: None,
        arguments: Some(fragment.into()),
    })
}

/// A complete round that answers with `text`.
pub fn text_round(text: &str) -> Vec<Delta> {
    vec![content(text), finish_stop()]
}

/// A complete round that calls one tool, with the arguments split into
/// two fragments.
pub fn tool_round(index: u32, id: &str, name: &str, arguments: &str) -> Vec<Delta> {
    let mid = arguments.len() / 2;
    let split = (0..=mid)
        .rev()
        .find(|&i| arguments.is_char_boundary(i))
        .unwrap_or(0);
    let (head, tail) = arguments.split_at(split);
    vec![
        tool_start(index, id, name),
        tool_args(index, head),
        tool_args(index, tail),
        finish_tool_calls(),
    ]
}

/// Drains a receiver until the sender side is gone.
pub async fn collect_events(mut rx: mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// The wire types of `events`, in order.
pub fn event_types(events: &[ClientEvent]) -> Vec<&'static str> {
    events.iter().map(ClientEvent::event_type).collect()
}

/// A registry with `echo` (returns its arguments), `fail` (always errors)
/// and `empty` (returns an empty string).
pub fn sample_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(tool_fn(
            ToolDefinition::new("echo", "Echo the arguments back", json!({"type": "object"})),
            |input: Value| async move { Ok(input) },
        ))
        .register(tool_fn(
            ToolDefinition::new("fail", "Always fails", json!({"type": "object"})),
            |_input: Value| async move { Err::<String, _>(ToolError::new("backend unavailable")) },
        ))
        .register(tool_fn(
            ToolDefinition::new("empty", "Returns nothing", json!({"type": "object"})),
            |_input: Value| async move { Ok("") },
        ));
    registry
}

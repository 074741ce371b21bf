//! # turnstream
//!
//! A streaming inference orchestration engine. It takes one upstream
//! streaming chat completion, plus however many tool round-trips the model
//! asks for, and turns them into one logical assistant turn delivered to a
//! client as an ordered stream of events.
//!
//! This crate is provider-agnostic. Concrete upstreams live in sibling
//! crates and implement [`Upstream`] (or its object-safe counterpart
//! [`DynUpstream`]).
//!
//! # Architecture
//!
//! ```text
//!   upstream bytes ─▶ frame decoder ─▶ delta parser      (provider crate)
//!                                          │
//!                                          ▼ DeltaStream
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ engine: Round ─▶ ToolCallAccumulator ─▶ ToolExecutor ─┐       │
//!   │           ▲                                            │      │
//!   │           └──────────── extended transcript ◀──────────┘      │
//!   └──────────────────────────────┬───────────────────────────────┘
//!                                  ▼ ClientEvent
//!                           event: <type>\ndata: <json>
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//! use turnstream::{ChatMessage, ChatRequest, DynUpstream, EngineConfig, ToolRegistry};
//!
//! # async fn example(upstream: Arc<dyn DynUpstream>) {
//! let request = ChatRequest {
//!     messages: vec![ChatMessage::user("What's 2 + 3?")],
//!     ..Default::default()
//! };
//! let mut events = turnstream::turn_stream(
//!     upstream,
//!     Arc::new(ToolRegistry::new()),
//!     request,
//!     EngineConfig::default(),
//!     CancellationToken::new(),
//! );
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_sse());
//! }
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`accumulator`] | Per-round reassembly of fragmented tool calls |
//! | [`chat`] | Transcript messages, tool calls, tool results |
//! | [`delta`] | The incremental output vocabulary upstreams produce |
//! | [`engine`] | The multi-round tool loop and its entry points |
//! | [`error`] | Unified [`EngineError`] |
//! | [`event`] | The client-facing event protocol and SSE encoding |
//! | [`tool`] | Tool handlers, registry, and the [`ToolExecutor`] seam |
//! | [`upstream`] | The [`Upstream`] trait and [`ChatRequest`] |

#![warn(missing_docs)]

pub mod accumulator;
pub mod chat;
pub mod delta;
pub mod engine;
pub mod error;
pub mod event;
pub mod tool;
pub mod upstream;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use accumulator::{RoundToolCalls, ToolCallAccumulator};
pub use chat::{ChatMessage, ChatRole, ContentBlock, ToolCall, ToolResult};
pub use delta::{Delta, DeltaStream, FinishReason, ToolCallDelta};
pub use engine::{EngineConfig, TurnOutcome, TurnStatus, run_turn, spawn_turn, turn_stream};
pub use error::EngineError;
pub use event::{ClientEvent, EventStream, sse_body};
pub use tool::{ToolError, ToolExecutor, ToolHandler, ToolRegistry, tool_fn};
pub use upstream::{ChatRequest, DynUpstream, ToolDefinition, Upstream};

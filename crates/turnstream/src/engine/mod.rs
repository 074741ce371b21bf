//! The tool execution orchestrator.
//!
//! A turn starts with the caller's transcript and runs upstream rounds until
//! the model finishes without asking for tools. Each round's tool calls run
//! sequentially in index order, and each call extends the transcript with an
//! assistant `tool_calls` message and a `tool` result message before the
//! next round is requested.
//!
//! Three entry points share one implementation:
//!
//! | Function | Runs on | Delivers events through |
//! |----------|---------|-------------------------|
//! | [`run_turn`] | the calling task | a caller-supplied `mpsc::Sender` |
//! | [`spawn_turn`] | a new tokio task | a bounded channel it creates |
//! | [`turn_stream`] | a new tokio task | an [`EventStream`] |
//!
//! # Cancellation
//!
//! Cancelling the token or dropping the receiving end stops the turn at its
//! next suspension point: the upstream stream is dropped (releasing the
//! connection), an in-flight tool future is dropped, and no further tools
//! start. No terminal event is sent in that case.

mod config;
mod round;
mod sink;
mod turn;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub use config::{
    DEFAULT_EVENT_BUFFER, DEFAULT_MAX_ROUNDS, EngineConfig, TurnOutcome, TurnStatus,
};

use crate::event::{ClientEvent, EventStream};
use crate::tool::ToolExecutor;
use crate::upstream::{ChatRequest, DynUpstream};
use sink::EventSink;
use turn::Turn;

/// Drives one turn to completion on the current task.
///
/// Events are sent to `events` in production order. The returned
/// [`TurnOutcome`] carries the extended transcript for persistence.
///
/// ```rust,no_run
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use turnstream::{ChatMessage, ChatRequest, ClientEvent, DynUpstream, EngineConfig, ToolRegistry};
///
/// # async fn example(upstream: &dyn DynUpstream) {
/// let tools = ToolRegistry::new();
/// let request = ChatRequest {
///     messages: vec![ChatMessage::user("Hello")],
///     ..Default::default()
/// };
/// let (tx, mut rx) = mpsc::channel::<ClientEvent>(64);
/// let printer = tokio::spawn(async move {
///     while let Some(event) = rx.recv().await {
///         print!("{}", event.to_sse());
///     }
/// });
///
/// let config = EngineConfig::default();
/// let outcome =
///     turnstream::run_turn(upstream, &tools, request, &config, tx, CancellationToken::new()).await;
/// printer.await.unwrap();
/// println!("{} rounds", outcome.rounds);
/// # }
/// ```
#[instrument(
    name = "turn",
    skip_all,
    fields(model = request.model.as_deref().unwrap_or("default"), messages = request.messages.len())
)]
pub async fn run_turn(
    upstream: &dyn DynUpstream,
    tools: &dyn ToolExecutor,
    request: ChatRequest,
    config: &EngineConfig,
    events: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
) -> TurnOutcome {
    Turn::new(upstream, tools, request, config, EventSink::new(events), cancel)
        .run()
        .await
}

/// Runs a turn on a spawned task behind a bounded channel.
///
/// The channel holds at most [`EngineConfig::event_buffer`] events; a slow
/// consumer stalls the turn instead of growing memory. Dropping the
/// receiver counts as a client disconnect.
///
/// # Panics
///
/// Must be called from within a tokio runtime.
pub fn spawn_turn(
    upstream: Arc<dyn DynUpstream>,
    tools: Arc<dyn ToolExecutor>,
    request: ChatRequest,
    config: EngineConfig,
    cancel: CancellationToken,
) -> (mpsc::Receiver<ClientEvent>, JoinHandle<TurnOutcome>) {
    let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
    let handle = tokio::spawn(async move {
        run_turn(
            upstream.as_ref(),
            tools.as_ref(),
            request,
            &config,
            tx,
            cancel,
        )
        .await
    });
    (rx, handle)
}

/// Runs a turn on a spawned task and exposes its events as a stream.
///
/// Dropping the stream cancels the turn. Pair with
/// [`sse_body`](crate::event::sse_body) to serve it over HTTP.
pub fn turn_stream(
    upstream: Arc<dyn DynUpstream>,
    tools: Arc<dyn ToolExecutor>,
    request: ChatRequest,
    config: EngineConfig,
    cancel: CancellationToken,
) -> EventStream {
    let (rx, _handle) = spawn_turn(upstream, tools, request, config, cancel);
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}

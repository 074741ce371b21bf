//! The per-turn state machine.
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │
//!       Streaming ──finish──▶ RoundDone ──calls──▶ ExecutingTools
//!            │                    │
//!            │                    └──no calls──▶ Done
//!            └──transport failure / round cap──▶ Failed
//! ```
//!
//! Every suspension point (opening the upstream, reading a delta, running a
//! tool, delivering an event) also watches the cancellation token and the
//! consumer. Either one firing moves the turn to `Cancelled`.

use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{EngineConfig, TurnOutcome, TurnStatus};
use super::round::Round;
use super::sink::{Disconnected, EventSink};
use crate::accumulator::{CompletedToolCall, RoundToolCalls};
use crate::chat::{ChatMessage, ToolCall, ToolResult};
use crate::error::EngineError;
use crate::event::ClientEvent;
use crate::tool::{ToolError, ToolExecutor, ToolOutput};
use crate::upstream::{ChatRequest, DynUpstream};

enum Phase {
    Streaming,
    RoundDone(Round),
    ExecutingTools {
        text: String,
        calls: Vec<CompletedToolCall>,
    },
    Done,
    Failed(EngineError),
    Cancelled,
}

/// Why the turn left the happy path.
enum Stop {
    Failed(EngineError),
    Cancelled,
}

impl From<Stop> for Phase {
    fn from(stop: Stop) -> Self {
        match stop {
            Stop::Failed(e) => Self::Failed(e),
            Stop::Cancelled => Self::Cancelled,
        }
    }
}

impl From<Disconnected> for Stop {
    fn from(_: Disconnected) -> Self {
        Self::Cancelled
    }
}

pub(crate) struct Turn<'a> {
    upstream: &'a dyn DynUpstream,
    tools: &'a dyn ToolExecutor,
    config: &'a EngineConfig,
    /// `request.messages` is the transcript.
    request: ChatRequest,
    sink: EventSink,
    cancel: CancellationToken,
    rounds: u32,
    tool_calls: u32,
    content: String,
}

impl<'a> Turn<'a> {
    pub(crate) fn new(
        upstream: &'a dyn DynUpstream,
        tools: &'a dyn ToolExecutor,
        mut request: ChatRequest,
        config: &'a EngineConfig,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        if request.tools.is_empty() {
            request.tools = tools.definitions();
        }
        Self {
            upstream,
            tools,
            config,
            request,
            sink,
            cancel,
            rounds: 0,
            tool_calls: 0,
            content: String::new(),
        }
    }

    pub(crate) async fn run(mut self) -> TurnOutcome {
        let mut phase = Phase::Streaming;
        let status = loop {
            phase = match phase {
                Phase::Streaming => match self.stream_round().await {
                    Ok(round) => Phase::RoundDone(round),
                    Err(stop) => stop.into(),
                },
                Phase::RoundDone(round) => self.close_round(round).await.unwrap_or_else(Into::into),
                Phase::ExecutingTools { text, calls } => {
                    match self.execute_tools(text, calls).await {
                        Ok(()) => Phase::Streaming,
                        Err(stop) => stop.into(),
                    }
                }
                Phase::Done => {
                    let rounds = self.rounds;
                    debug!(rounds, tool_calls = self.tool_calls, "turn complete");
                    // The turn is complete even if nobody is left to hear it.
                    let _ = self.emit(ClientEvent::Done { rounds }).await;
                    break TurnStatus::Completed;
                }
                Phase::Failed(err) => {
                    warn!(kind = err.kind(), error = %err, rounds = self.rounds, "turn failed");
                    let _ = self.emit(ClientEvent::error(&err)).await;
                    break TurnStatus::Failed(err);
                }
                Phase::Cancelled => {
                    debug!(
                        rounds = self.rounds,
                        events_sent = self.sink.sent(),
                        "turn cancelled"
                    );
                    break TurnStatus::Cancelled;
                }
            };
        };

        TurnOutcome {
            transcript: self.request.messages,
            content: self.content,
            rounds: self.rounds,
            tool_calls: self.tool_calls,
            status,
        }
    }

    /// One upstream call, forwarding deltas until a finish signal or the
    /// end of the stream.
    async fn stream_round(&mut self) -> Result<Round, Stop> {
        if let Some(limit) = self.config.max_rounds {
            if self.rounds >= limit {
                return Err(Stop::Failed(EngineError::MaxRoundsExceeded { limit }));
            }
        }
        self.rounds += 1;
        debug!(
            round = self.rounds,
            messages = self.request.messages.len(),
            "starting round"
        );

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            () = self.sink.closed() => None,
            res = self.upstream.stream_boxed(&self.request) => Some(res),
        };
        let mut stream = match opened {
            None => return Err(Stop::Cancelled),
            Some(Err(e)) => return Err(Stop::Failed(e)),
            Some(Ok(stream)) => stream,
        };

        let mut round = Round::new();
        while !round.is_finished() {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                () = self.sink.closed() => None,
                item = stream.next() => Some(item),
            };
            match next {
                None => return Err(Stop::Cancelled),
                Some(None) => {
                    debug!(round = self.rounds, "upstream ended without finish signal");
                    break;
                }
                Some(Some(Err(e))) => return Err(Stop::Failed(e)),
                Some(Some(Ok(delta))) => {
                    if let Some(event) = round.observe(delta) {
                        if let ClientEvent::Content { text } = &event {
                            self.content.push_str(text);
                        }
                        self.emit(event).await?;
                    }
                }
            }
        }
        Ok(round)
    }

    async fn close_round(&mut self, round: Round) -> Result<Phase, Stop> {
        let Round {
            text,
            accumulator,
            finish,
        } = round;
        debug!(round = self.rounds, ?finish, pending = accumulator.len(), "round finished");
        if accumulator.is_empty() {
            return Ok(Phase::Done);
        }

        let RoundToolCalls { calls, malformed } = accumulator.finish();
        for bad in malformed {
            warn!(
                index = bad.index,
                name = bad.name.as_deref().unwrap_or(""),
                reason = %bad.reason,
                "abandoning malformed tool call"
            );
            self.emit(ClientEvent::ToolError {
                index: bad.index,
                id: bad.id,
                name: bad.name,
                message: bad.reason.to_string(),
            })
            .await?;
        }

        if calls.is_empty() {
            return Ok(Phase::Done);
        }
        Ok(Phase::ExecutingTools { text, calls })
    }

    /// Runs the round's calls one after another in index order, extending
    /// the transcript after each.
    async fn execute_tools(&mut self, text: String, calls: Vec<CompletedToolCall>) -> Result<(), Stop> {
        let mut text = Some(text);
        for CompletedToolCall { index, call } in calls {
            if self.cancel.is_cancelled() || self.sink.is_closed() {
                return Err(Stop::Cancelled);
            }
            self.emit(ClientEvent::ToolCall {
                index,
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            })
            .await?;

            let outcome = self.invoke(&call).await?;
            let (event, result) = match outcome {
                Ok(output) if !output.is_blank() => (
                    ClientEvent::ToolResult {
                        index,
                        id: call.id.clone(),
                        name: call.name.clone(),
                        result: output.content.clone(),
                    },
                    ToolResult::success(call.id.clone(), output.content),
                ),
                outcome => {
                    let err = outcome
                        .err()
                        .unwrap_or_else(|| ToolError::new("Tool returned an empty result"));
                    warn!(index, tool = %call.name, error = %err, "tool call failed");
                    (
                        ClientEvent::ToolError {
                            index,
                            id: call.id.clone(),
                            name: Some(call.name.clone()),
                            message: err.message.clone(),
                        },
                        ToolResult::failure(call.id.clone(), &err),
                    )
                }
            };

            let messages = &mut self.request.messages;
            messages.push(ChatMessage::assistant_tool_calls(text.take(), vec![call]));
            messages.push(ChatMessage::tool_result(result));
            self.emit(event).await?;
        }
        Ok(())
    }

    async fn invoke(&mut self, call: &ToolCall) -> Result<Result<ToolOutput, ToolError>, Stop> {
        self.tool_calls += 1;
        let started = Instant::now();
        let tool_timeout = self.config.tool_timeout;
        let exec = self.tools.execute(&call.name, call.arguments.clone());
        let bounded = async move {
            match tool_timeout {
                Some(limit) => tokio::time::timeout(limit, exec).await.unwrap_or_else(|_| {
                    Err(ToolError::new(format!(
                        "Tool timed out after {}ms",
                        limit.as_millis()
                    )))
                }),
                None => exec.await,
            }
        };

        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            () = self.sink.closed() => None,
            res = bounded => Some(res),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Some(res) => {
                info!(tool = %call.name, id = %call.id, elapsed_ms, ok = res.is_ok(), "tool executed");
                Ok(res)
            }
            None => {
                debug!(tool = %call.name, elapsed_ms, "tool call abandoned");
                Err(Stop::Cancelled)
            }
        }
    }

    async fn emit(&mut self, event: ClientEvent) -> Result<(), Stop> {
        let sent = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Disconnected),
            res = self.sink.emit(event) => res,
        };
        sent.map_err(Stop::from)
    }
}

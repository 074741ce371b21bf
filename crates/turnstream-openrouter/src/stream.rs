//! Delta parser: decoded SSE frames to engine [`Delta`]s.
//!
//! A frame that is not valid JSON is logged and dropped; the round goes
//! on. A frame carrying an `error` object is a mid-stream upstream failure
//! and ends the round with [`EngineError::Upstream`].

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use turnstream::delta::{Delta, DeltaStream, ToolCallDelta};
use turnstream::EngineError;

use crate::convert::convert_finish_reason;
use crate::sse::RawFrame;
use crate::types::{ErrorDetail, StreamChunk};

/// Longest payload prefix included in a malformed-frame warning.
const LOG_PAYLOAD_LIMIT: usize = 200;

/// Why a frame produced no deltas.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload is not a chunk the parser understands. Recoverable.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The upstream reported an error inside the stream. Fatal for the turn.
    #[error("upstream error ({code}): {message}")]
    Upstream {
        /// Provider error code, stringified.
        code: String,
        /// Provider error message.
        message: String,
    },
}

/// Parses one frame payload.
///
/// A single frame may carry several concerns at once; they come out in a
/// fixed order: reasoning, content, tool-call fragments by position, then
/// the finish signal. Empty text fragments are skipped.
///
/// # Errors
///
/// [`FrameError::Malformed`] for unparseable JSON, [`FrameError::Upstream`]
/// for an `error` object.
pub fn parse_frame(payload: &str) -> Result<Vec<Delta>, FrameError> {
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    if let Some(error) = chunk.error {
        return Err(upstream_error(error));
    }

    let mut deltas = Vec::new();
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(deltas);
    };
    let delta = choice.delta;

    if let Some(text) = delta.reasoning.filter(|t| !t.is_empty()) {
        deltas.push(Delta::Reasoning(text));
    }
    if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
        deltas.push(Delta::Content(text));
    }
    for tc in delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = tc
            .function
            .map_or((None, None), |f| (f.name, f.arguments));
        let fragment = ToolCallDelta {
            index: tc.index,
            id: tc.id.filter(|s| !s.is_empty()),
            name: name.filter(|s| !s.is_empty()),
            arguments: arguments.filter(|s| !s.is_empty()),
        };
        if fragment.id.is_some() || fragment.name.is_some() || fragment.arguments.is_some() {
            deltas.push(Delta::ToolCall(fragment));
        }
    }
    if let Some(reason) = choice.finish_reason {
        deltas.push(Delta::Finish {
            reason: convert_finish_reason(&reason),
        });
    }
    Ok(deltas)
}

fn upstream_error(error: ErrorDetail) -> FrameError {
    let code = match error.code {
        Some(Value::String(code)) => code,
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    };
    FrameError::Upstream {
        code,
        message: error.message,
    }
}

/// Wraps a frame stream as a [`DeltaStream`].
///
/// Ends at [`RawFrame::Done`] without polling the source again.
pub fn into_delta_stream<S>(frames: S) -> DeltaStream
where
    S: Stream<Item = Result<RawFrame, EngineError>> + Send + 'static,
{
    let deltas = frames
        .take_while(|frame| futures::future::ready(!matches!(frame, Ok(RawFrame::Done))))
        .flat_map(|frame| {
            let items: Vec<Result<Delta, EngineError>> = match frame {
                Ok(RawFrame::Data(payload)) => match parse_frame(&payload) {
                    Ok(deltas) => deltas.into_iter().map(Ok).collect(),
                    Err(FrameError::Malformed(e)) => {
                        tracing::warn!(
                            error = %e,
                            payload = truncate(&payload, LOG_PAYLOAD_LIMIT),
                            "Dropping malformed SSE frame"
                        );
                        Vec::new()
                    }
                    Err(FrameError::Upstream { code, message }) => {
                        vec![Err(EngineError::Upstream { code, message })]
                    }
                },
                Ok(RawFrame::Done) => Vec::new(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        });
    Box::pin(deltas)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

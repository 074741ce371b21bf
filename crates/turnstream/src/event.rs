//! The client-facing event protocol.
//!
//! Every turn is delivered to the client as an ordered sequence of
//! [`ClientEvent`]s, each encoded on the wire as one server-sent event:
//!
//! ```text
//! event: <type>
//! data: <json>
//!
//! ```
//!
//! Round boundaries are not visible. A client sees one continuous turn in
//! which `tool_call`/`tool_result` pairs interleave with content, ending in
//! exactly one `done` or `error` (unless the client went away first).

use std::convert::Infallible;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::{Value, json};

use crate::error::EngineError;

/// A pinned, boxed stream of client events for one turn.
pub type EventStream = Pin<Box<dyn Stream<Item = ClientEvent> + Send>>;

/// One event of the downstream protocol.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ClientEvent {
    /// A fragment of the visible answer.
    Content {
        /// The fragment.
        text: String,
    },
    /// A fragment of the model's reasoning.
    Reasoning {
        /// The fragment.
        text: String,
    },
    /// A tool call has been reassembled and is about to run.
    ToolCall {
        /// Index of the call within its round.
        index: u32,
        /// Call identifier.
        id: String,
        /// Tool name.
        name: String,
        /// Parsed arguments.
        arguments: Value,
    },
    /// Raw fragments of a tool call as they stream in.
    ToolCallProgress {
        /// Index of the call within its round.
        index: u32,
        /// Identifier fragment, if this delta carried one.
        id: Option<String>,
        /// Name fragment, if this delta carried one.
        name: Option<String>,
        /// Arguments fragment, if this delta carried one.
        arguments: Option<String>,
    },
    /// A tool finished and produced text.
    ToolResult {
        /// Index of the call within its round.
        index: u32,
        /// Call identifier.
        id: String,
        /// Tool name.
        name: String,
        /// The stringified result.
        result: String,
    },
    /// A tool call was abandoned or its execution failed.
    ToolError {
        /// Index of the call within its round.
        index: u32,
        /// Call identifier.
        id: String,
        /// Tool name, when one was received.
        name: Option<String>,
        /// What went wrong.
        message: String,
    },
    /// The turn is complete.
    Done {
        /// How many upstream rounds the turn took.
        rounds: u32,
    },
    /// The turn failed.
    Error {
        /// Stable discriminator, see [`EngineError::kind`].
        kind: String,
        /// Human-readable description.
        message: String,
    },
}

impl ClientEvent {
    /// Builds the terminal `error` event for an engine failure.
    pub fn error(err: &EngineError) -> Self {
        Self::Error {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }

    /// The wire `type` of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolCallProgress { .. } => "tool_call_progress",
            Self::ToolResult { .. } => "tool_result",
            Self::ToolError { .. } => "tool_error",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// The wire `data` payload of this event.
    pub fn data(&self) -> Value {
        match self {
            Self::Content { text } | Self::Reasoning { text } => json!({ "text": text }),
            Self::ToolCall {
                index,
                id,
                name,
                arguments,
            } => json!({ "index": index, "id": id, "name": name, "arguments": arguments }),
            Self::ToolCallProgress {
                index,
                id,
                name,
                arguments,
            } => json!({ "index": index, "id": id, "name": name, "arguments": arguments }),
            Self::ToolResult {
                index,
                id,
                name,
                result,
            } => json!({ "index": index, "id": id, "name": name, "result": result }),
            Self::ToolError {
                index,
                id,
                name,
                message,
            } => json!({ "index": index, "id": id, "name": name, "error": message }),
            Self::Done { rounds } => json!({ "rounds": rounds }),
            Self::Error { kind, message } => json!({ "kind": kind, "message": message }),
        }
    }

    /// Encodes the event as one SSE frame.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_type(), self.data())
    }
}

impl Serialize for ClientEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ClientEvent", 2)?;
        state.serialize_field("type", self.event_type())?;
        state.serialize_field("data", &self.data())?;
        state.end()
    }
}

/// Turns an event stream into an SSE response body.
///
/// The item type fits the body constructors of the common HTTP servers.
pub fn sse_body(events: EventStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    events.map(|event| Ok::<_, Infallible>(Bytes::from(event.to_sse())))
}

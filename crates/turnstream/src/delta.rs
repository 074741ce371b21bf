//! Incremental model output.
//!
//! An upstream yields a [`DeltaStream`]: one [`Delta`] per logical concern
//! found in each frame, in the order the frame carried them. A round ends
//! with a [`Finish`](Delta::Finish) delta or, failing that, with the end of
//! the stream.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use turnstream::delta::{Delta, DeltaStream};
//!
//! async fn print_round(mut stream: DeltaStream) {
//!     while let Some(delta) = stream.next().await {
//!         match delta {
//!             Ok(Delta::Content(text)) => print!("{text}"),
//!             Ok(Delta::Finish { reason }) => println!("\n[finish: {reason:?}]"),
//!             Err(e) => eprintln!("stream error: {e}"),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A pinned, boxed, `Send` stream of [`Delta`] results for one round.
///
/// An `Err` item is a transport failure and is always the last item.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, EngineError>> + Send>>;

/// One incremental fragment of model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Delta {
    /// A fragment of the visible answer.
    Content(String),
    /// A fragment of the model's reasoning output.
    Reasoning(String),
    /// A fragment of a tool call.
    ToolCall(ToolCallDelta),
    /// The model finished the round.
    Finish {
        /// Why the model stopped.
        reason: FinishReason,
    },
}

/// A piece of one tool call, keyed by its index within the round.
///
/// Every field other than `index` is a fragment to be appended to what
/// previous deltas with the same index carried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Zero-based position of the call within the round.
    pub index: u32,
    /// Fragment of the call identifier.
    pub id: Option<String>,
    /// Fragment of the tool name.
    pub name: Option<String>,
    /// Fragment of the JSON arguments text.
    pub arguments: Option<String>,
}

/// Why the model ended a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// The model wants tools to run.
    ToolCalls,
    /// The token limit was reached.
    Length,
    /// Output was withheld by a content filter.
    ContentFilter,
    /// A provider-specific reason.
    Other(String),
}

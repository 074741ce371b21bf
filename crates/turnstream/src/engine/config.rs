//! Engine configuration and turn results.

use std::time::Duration;

use crate::chat::ChatMessage;
use crate::error::EngineError;

/// Default cap on upstream rounds per turn.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Default capacity of the event channel used by
/// [`spawn_turn`](super::spawn_turn).
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Configuration for one turn.
///
/// ```rust
/// use std::time::Duration;
/// use turnstream::EngineConfig;
///
/// let config = EngineConfig {
///     tool_timeout: Some(Duration::from_secs(30)),
///     ..Default::default()
/// };
/// assert_eq!(config.max_rounds, Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of upstream calls in one turn. `None` lets the
    /// model loop for as long as it keeps requesting tools. Default: 10.
    pub max_rounds: Option<u32>,
    /// Deadline for a single tool invocation. A tool that overruns is
    /// reported as a `tool_error`. Default: none.
    pub tool_timeout: Option<Duration>,
    /// Capacity of the bounded event channel. A slow consumer stalls the
    /// turn once this many events are queued. Default: 64.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: Some(DEFAULT_MAX_ROUNDS),
            tool_timeout: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// How a turn ended.
#[derive(Debug)]
#[non_exhaustive]
pub enum TurnStatus {
    /// The model produced a final answer; `done` was emitted.
    Completed,
    /// A transport-class failure ended the turn; `error` was emitted.
    Failed(EngineError),
    /// The caller cancelled or the consumer went away.
    Cancelled,
}

/// Everything a caller may want to persist after a turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The caller's messages followed by every message the turn appended.
    /// The final answer text is in [`content`](Self::content), not here.
    pub transcript: Vec<ChatMessage>,
    /// All content fragments of the turn, concatenated in order.
    pub content: String,
    /// Number of upstream calls made.
    pub rounds: u32,
    /// Number of tool invocations attempted.
    pub tool_calls: u32,
    /// How the turn ended.
    pub status: TurnStatus,
}

impl TurnOutcome {
    /// Whether the turn ended with `done`.
    pub fn is_completed(&self) -> bool {
        matches!(self.status, TurnStatus::Completed)
    }

    /// The failure that ended the turn, if any.
    pub fn error(&self) -> Option<&EngineError> {
        match &self.status {
            TurnStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

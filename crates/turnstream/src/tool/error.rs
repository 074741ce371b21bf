//! Tool error type.

/// Failure of one tool invocation.
///
/// Never fatal to a turn: the engine reports it as a `tool_error` event
/// and records `Tool execution failed: <message>` as the call's result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    /// Human-readable error description.
    pub message: String,
}

impl ToolError {
    /// Creates a new tool error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

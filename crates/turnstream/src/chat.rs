//! Transcript types.
//!
//! A [`ChatMessage`] is one entry of the transcript sent upstream each
//! round. The engine owns the transcript for the duration of a turn and
//! only ever appends to it: first the caller's prior messages, then one
//! assistant `tool_calls` message and one `tool` message per executed
//! call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions that frame the conversation.
    System,
    /// The human side of the conversation.
    User,
    /// The model.
    Assistant,
    /// The output of a tool call.
    Tool,
}

impl ChatRole {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A fully reassembled tool call with parsed arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Upstream-assigned identifier, echoed back in the tool result.
    pub id: String,
    /// The name of the tool to invoke.
    pub name: String,
    /// Arguments, parsed from the concatenated JSON fragments.
    pub arguments: Value,
}

/// The stringified outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The [`ToolCall::id`] this result answers.
    pub tool_call_id: String,
    /// Result text as seen by the model.
    pub content: String,
    /// Whether the text describes a failure rather than a result.
    pub is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// A failure, recorded with the text the model will see.
    pub fn failure(tool_call_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: format!("Tool execution failed: {message}"),
            is_error: true,
        }
    }
}

/// One piece of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image the model should look at.
    Image {
        /// An `https:` URL or a base64 `data:` URL.
        url: String,
    },
    /// A tool invocation requested by the assistant.
    ToolCall(ToolCall),
    /// The answer to an earlier tool invocation.
    ToolResult(ToolResult),
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: ChatRole,
    /// Ordered body blocks.
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    /// A text message with the given role.
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Shorthand for a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(ChatRole::System, text)
    }

    /// Shorthand for a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(ChatRole::User, text)
    }

    /// A user message with text followed by images.
    ///
    /// ```rust
    /// use turnstream::{ChatMessage, ContentBlock};
    ///
    /// let msg = ChatMessage::user_with_images("What is this?", ["https://example.com/cat.png"]);
    /// assert_eq!(msg.content.len(), 2);
    /// assert!(matches!(&msg.content[1], ContentBlock::Image { url } if url.ends_with("cat.png")));
    /// ```
    pub fn user_with_images<I, U>(text: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        let mut content = vec![ContentBlock::Text { text: text.into() }];
        content.extend(urls.into_iter().map(|url| ContentBlock::Image { url: url.into() }));
        Self {
            role: ChatRole::User,
            content,
        }
    }

    /// Whether any block is an image.
    pub fn has_images(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::Image { .. }))
    }

    /// Shorthand for an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, text)
    }

    /// An assistant message requesting tool calls, optionally preceded by
    /// the text the model streamed in the same round.
    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            content.push(ContentBlock::Text { text });
        }
        content.extend(calls.into_iter().map(ContentBlock::ToolCall));
        Self {
            role: ChatRole::Assistant,
            content,
        }
    }

    /// A `tool` role message carrying one result.
    pub fn tool_result(result: ToolResult) -> Self {
        Self {
            role: ChatRole::Tool,
            content: vec![ContentBlock::ToolResult(result)],
        }
    }

    /// Concatenated text blocks, or `None` if the message has no text.
    pub fn text_content(&self) -> Option<String> {
        let mut text = String::new();
        let mut found = false;
        for block in &self.content {
            if let ContentBlock::Text { text: t } = block {
                text.push_str(t);
                found = true;
            }
        }
        found.then_some(text)
    }

    /// Tool calls carried by this message, in order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// The tool result carried by this message, if any.
    pub fn tool_result_block(&self) -> Option<&ToolResult> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

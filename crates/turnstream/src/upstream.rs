//! The upstream trait and request types.
//!
//! - **[`Upstream`]** is what a chat-completion backend implements. It
//!   uses native async-fn-in-traits, so implementations are plain
//!   `async fn`s.
//! - **[`DynUpstream`]** is its object-safe mirror with boxed futures. A
//!   blanket `impl<T: Upstream> DynUpstream for T` bridges the two, which
//!   is what lets the engine hold an `Arc<dyn DynUpstream>`.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;
use crate::delta::DeltaStream;
use crate::error::EngineError;

/// A streaming chat-completion backend.
///
/// One call to [`stream`](Self::stream) is one round. HTTP status
/// failures must surface as the returned `Err`, before any delta; broken
/// connections and timeouts after that point surface as the stream's
/// final `Err` item.
pub trait Upstream: Send + Sync {
    /// Opens a streaming completion for the given request.
    fn stream(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<DeltaStream, EngineError>> + Send;
}

/// Object-safe counterpart of [`Upstream`].
pub trait DynUpstream: Send + Sync {
    /// Boxed-future version of [`Upstream::stream`].
    fn stream_boxed<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, EngineError>> + Send + 'a>>;
}

impl<T: Upstream> DynUpstream for T {
    fn stream_boxed<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeltaStream, EngineError>> + Send + 'a>> {
        Box::pin(self.stream(request))
    }
}

/// Everything the upstream needs for one round.
///
/// The engine clones the caller's request each round and swaps in the
/// current transcript. Use struct-update syntax for construction:
///
/// ```rust
/// use turnstream::{ChatMessage, ChatRequest};
///
/// let request = ChatRequest {
///     messages: vec![ChatMessage::user("What's the weather in Oslo?")],
///     system: Some("You are terse.".into()),
///     ..Default::default()
/// };
/// assert!(request.tools.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The transcript so far.
    pub messages: Vec<ChatMessage>,
    /// System prompt, sent ahead of `messages`.
    pub system: Option<String>,
    /// Model override; the upstream's configured model when `None`.
    pub model: Option<String>,
    /// Tools the model may call. Filled from the executor when empty.
    pub tools: Vec<ToolDefinition>,
    /// Output token cap; the upstream picks a default when `None`.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// Ask the model to stream its reasoning.
    pub reasoning: bool,
}

/// A tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Name the model uses to call the tool.
    pub name: String,
    /// Tells the model when the tool is useful.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Creates a definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

//! Tool handler trait and closure-backed implementation.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::{ToolError, ToolOutput};
use crate::upstream::ToolDefinition;

/// A single tool the model can invoke.
///
/// The trait is object-safe (boxed futures) so handlers can be stored as
/// `Arc<dyn ToolHandler>` in a [`ToolRegistry`](super::ToolRegistry).
/// For simple tools, wrap a closure with [`tool_fn`].
pub trait ToolHandler: Send + Sync {
    /// Returns the tool's definition (name, description, parameter schema).
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given JSON arguments.
    fn execute<'a>(
        &'a self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;
}

/// A tool handler backed by an async closure, created by [`tool_fn`].
pub struct FnToolHandler<F> {
    definition: ToolDefinition,
    handler: F,
}

impl<F> std::fmt::Debug for FnToolHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnToolHandler")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

impl<F, Fut, O> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    O: Into<ToolOutput> + Send + 'static,
{
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn execute<'a>(
        &'a self,
        input: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>> {
        let fut = (self.handler)(input);
        Box::pin(async move { fut.await.map(Into::into) })
    }
}

/// Creates a [`ToolHandler`] from a closure.
///
/// The closure receives the tool's JSON arguments and returns a
/// `Result<impl Into<ToolOutput>, ToolError>`, so `String`, `&str` and
/// `serde_json::Value` results all work.
///
/// ```rust
/// use serde_json::{json, Value};
/// use turnstream::ToolDefinition;
/// use turnstream::tool::{tool_fn, ToolHandler};
///
/// let add = tool_fn(
///     ToolDefinition::new(
///         "add",
///         "Add two numbers",
///         json!({
///             "type": "object",
///             "properties": { "a": {"type": "number"}, "b": {"type": "number"} },
///             "required": ["a", "b"]
///         }),
///     ),
///     |input: Value| async move {
///         let a = input["a"].as_f64().unwrap_or(0.0);
///         let b = input["b"].as_f64().unwrap_or(0.0);
///         Ok(json!({ "sum": a + b }))
///     },
/// );
/// assert_eq!(add.definition().name, "add");
/// ```
pub fn tool_fn<F, Fut, O>(definition: ToolDefinition, handler: F) -> FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ToolError>> + Send + 'static,
    O: Into<ToolOutput> + Send + 'static,
{
    FnToolHandler {
        definition,
        handler,
    }
}

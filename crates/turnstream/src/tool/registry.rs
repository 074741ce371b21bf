//! The tool capability seam and the name-indexed registry behind it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::{ToolError, ToolHandler, ToolOutput};
use crate::upstream::ToolDefinition;

/// What the engine needs from a tool backend: run a named tool on JSON
/// arguments and hand back its output.
///
/// [`ToolRegistry`] is the usual implementation. Anything else (a remote
/// tool service, a sandbox) can implement this directly.
pub trait ToolExecutor: Send + Sync {
    /// Tools to advertise to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Runs the named tool.
    fn execute<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;
}

/// A registry of tool handlers, indexed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool handler.
    ///
    /// If a handler with the same name already exists, it is replaced.
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> &mut Self {
        let name = handler.definition().name;
        self.handlers.insert(name, Arc::new(handler));
        self
    }

    /// Registers a shared tool handler.
    pub fn register_shared(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = handler.definition().name;
        self.handlers.insert(name, handler);
        self
    }

    /// Returns whether a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl ToolExecutor for ToolRegistry {
    /// Definitions sorted by name, so requests are stable across runs.
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.handlers.values().map(|h| h.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    fn execute<'a>(
        &'a self,
        name: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(handler) = self.handlers.get(name) else {
                return Err(ToolError::new(format!("Unknown tool: {name}")));
            };
            handler.execute(arguments).await
        })
    }
}

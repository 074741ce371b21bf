//! Tool output types.

use serde_json::Value;

/// Text returned by a tool, as the model will read it.
///
/// Tools may hand back plain text or any JSON value. Strings pass through
/// unchanged; every other value is pretty-printed.
///
/// ```rust
/// use serde_json::json;
/// use turnstream::tool::ToolOutput;
///
/// assert_eq!(ToolOutput::from(json!("sunny")).content, "sunny");
/// assert_eq!(ToolOutput::from(json!({"temp": 21})).content, "{\n  \"temp\": 21\n}");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// The content to return to the model.
    pub content: String,
}

impl ToolOutput {
    /// Creates a new tool output with the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Whether the tool produced nothing the model could use.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::new(s),
            Value::Null => Self::default(),
            other => {
                Self::new(serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()))
            }
        }
    }
}

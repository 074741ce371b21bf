//! The tool capability.
//!
//! ```text
//!   ToolHandler     one tool: schema + async execute
//!       │
//!   ToolRegistry    handlers by name
//!       │
//!   ToolExecutor    what the engine calls: name + JSON arguments -> text
//! ```

mod error;
mod handler;
mod output;
mod registry;

pub use error::ToolError;
pub use handler::{FnToolHandler, ToolHandler, tool_fn};
pub use output::ToolOutput;
pub use registry::{ToolExecutor, ToolRegistry};

//! Tool system
//!
//! Tools are the named operations the dispatcher exposes over MCP.

pub mod definition;
pub mod manager;
pub mod traits;

pub use definition::{Property, SchemaBuilder, ToolDefinition};
pub use manager::ToolManager;
pub use traits::{Tool, ToolResult};

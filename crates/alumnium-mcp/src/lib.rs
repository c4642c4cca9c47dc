//! alumnium-mcp: MCP (Model Context Protocol) front end
//!
//! Lists the registered tools over MCP and forwards `tools/call` requests to
//! the [`alumnium_core::ToolManager`]. Framing and transport come from `rmcp`.

pub mod adapter;
pub mod server;

pub use adapter::{arguments_value, to_call_result, to_mcp_tool};
pub use server::AlumniumServer;

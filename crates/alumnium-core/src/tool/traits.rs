//! Tool trait definition
//!
//! Defines the core trait for operations exposed to MCP clients.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::{Error, Result};

/// Tool execution result
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Output string from tool execution
    pub output: String,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }

    /// Successful result carrying a JSON document
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::success(serde_json::to_string_pretty(value)?))
    }

    /// Structured error result: `{"error": {"category", "message"}}`
    pub fn failure(error: &Error) -> Self {
        let body = json!({
            "error": {
                "category": error.category(),
                "message": error.to_string(),
            }
        });
        Self::error(serde_json::to_string_pretty(&body).unwrap_or_else(|_| error.to_string()))
    }

    /// Parse the output back into JSON (handy for callers and tests)
    pub fn output_json(&self) -> Option<JsonValue> {
        serde_json::from_str(&self.output).ok()
    }
}

/// Tool trait for MCP tool calls
///
/// Implement this trait to expose an operation through the dispatcher.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (used in MCP tool listings)
    fn name(&self) -> &str;

    /// Get the tool description (shown to the agent when selecting tools)
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's input parameters
    fn input_schema(&self) -> JsonValue;

    /// Execute the tool with already validated input
    ///
    /// # Arguments
    /// * `input` - JSON value containing the tool input parameters
    ///
    /// # Returns
    /// A `ToolResult` containing the output, or an error the dispatcher
    /// turns into a structured error result
    async fn execute(&self, input: JsonValue) -> Result<ToolResult>;
}

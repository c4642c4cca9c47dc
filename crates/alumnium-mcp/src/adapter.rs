//! Conversions between the tool system and MCP types

use std::sync::Arc;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::Value as JsonValue;

use alumnium_core::{ToolDefinition, ToolResult};

/// Tool listing entry for `tools/list`
pub fn to_mcp_tool(definition: &ToolDefinition) -> Tool {
    let schema: JsonObject = match &definition.input_schema {
        JsonValue::Object(map) => map.clone(),
        _ => JsonObject::new(),
    };

    Tool::new(
        definition.name.clone(),
        definition.description.clone(),
        Arc::new(schema),
    )
}

/// MCP arguments as the JSON object tools expect; absent arguments are `{}`
pub fn arguments_value(arguments: Option<JsonObject>) -> JsonValue {
    JsonValue::Object(arguments.unwrap_or_default())
}

/// `tools/call` reply: one text block, flagged as an error when the tool failed
pub fn to_call_result(result: ToolResult) -> CallToolResult {
    let content = vec![Content::text(result.output)];
    if result.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

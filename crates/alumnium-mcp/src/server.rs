//! MCP server exposing the tool catalog over stdio

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use tracing::{debug, info};

use alumnium_core::ToolManager;

use crate::adapter::{arguments_value, to_call_result, to_mcp_tool};

const INSTRUCTIONS: &str = "Alumnium automates browsers and mobile apps with natural language. \
Start with alumnium_start_driver, then use alumnium_do to act, alumnium_check to verify and \
alumnium_get to extract data. Use alumnium_area to confine work to one region of the page. \
Always finish with alumnium_quit_driver.";

/// MCP handler backed by a [`ToolManager`]
#[derive(Clone)]
pub struct AlumniumServer {
    tools: Arc<ToolManager>,
}

impl AlumniumServer {
    pub fn new(tools: Arc<ToolManager>) -> Self {
        Self { tools }
    }

    /// Serve on stdin/stdout until the client disconnects
    pub async fn serve_stdio(self) -> anyhow::Result<()> {
        info!(tools = self.tools.len(), "Serving MCP over stdio");

        let service = self.serve(rmcp::transport::stdio()).await?;
        let reason = service.waiting().await?;

        info!(reason = ?reason, "MCP client disconnected");
        Ok(())
    }
}

impl ServerHandler for AlumniumServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "alumnium-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .tools
            .definitions()
            .iter()
            .map(to_mcp_tool)
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = %request.name, "tools/call");
        let result = self
            .tools
            .dispatch(&request.name, arguments_value(request.arguments))
            .await;
        Ok(to_call_result(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alumnium_core::{Property, SchemaBuilder, Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::Value;

    struct PingTool;

    #[async_trait]
    impl Tool for PingTool {
        fn name(&self) -> &str {
            "ping"
        }

        fn description(&self) -> &str {
            "Reply with pong"
        }

        fn input_schema(&self) -> Value {
            SchemaBuilder::object(vec![Property::string("who", "Caller").optional()])
        }

        async fn execute(&self, _input: Value) -> alumnium_core::Result<ToolResult> {
            Ok(ToolResult::success("pong"))
        }
    }

    fn server() -> AlumniumServer {
        let mut tools = ToolManager::new();
        tools.register(Arc::new(PingTool));
        AlumniumServer::new(Arc::new(tools))
    }

    #[test]
    fn test_server_info() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, "alumnium-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("alumnium_start_driver"));
    }

    #[test]
    fn test_definitions_convert() {
        let server = server();
        let tools: Vec<_> = server.tools.definitions().iter().map(to_mcp_tool).collect();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ping");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_is_tool_error() {
        let server = server();
        let result = server.tools.dispatch("nope", arguments_value(None)).await;
        let call = to_call_result(result);
        assert_eq!(call.is_error, Some(true));
    }
}

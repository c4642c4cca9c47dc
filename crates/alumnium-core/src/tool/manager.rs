//! Tool manager for registering and executing tools

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::tool::{SchemaBuilder, Tool, ToolDefinition, ToolResult};
use crate::{Error, Result};

/// Manager for registered tools
///
/// Handles tool registration, retrieval, argument validation and execution.
pub struct ToolManager {
    /// Registered tools indexed by name
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, used for listings
    order: Vec<String>,
}

impl ToolManager {
    /// Create a new empty tool manager
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool
    ///
    /// If a tool with the same name already exists, it will be replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all registered tool definitions, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Validate and execute a tool by name
    ///
    /// # Errors
    /// Returns an error if the tool is unknown, the arguments do not match
    /// its schema, or execution fails
    pub async fn execute(&self, name: &str, input: JsonValue) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        SchemaBuilder::validate(&tool.input_schema(), &input)?;
        tool.execute(input).await
    }

    /// Execute a tool and fold any error into a structured error result
    ///
    /// This is the dispatcher entry point: it never fails.
    pub async fn dispatch(&self, name: &str, input: JsonValue) -> ToolResult {
        let started = Instant::now();
        debug!(tool = name, "Dispatching tool call");

        match self.execute(name, input).await {
            Ok(result) => {
                info!(
                    tool = name,
                    is_error = result.is_error,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call finished"
                );
                result
            }
            Err(e) => {
                warn!(
                    tool = name,
                    category = e.category(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call failed"
                );
                ToolResult::failure(&e)
            }
        }
    }

    /// Check if a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if no tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get all registered tool names, in registration order
    pub fn tool_names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Driver lifecycle tools: start, inspect, save cache, quit

use std::sync::Arc;

use alumnium_core::{
    Platform, Property, Result, SchemaBuilder, SessionStore, Tool, ToolResult,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use crate::args::{optional_str, required_str};

/// `alumnium_start_driver`
pub struct StartDriverTool {
    store: Arc<SessionStore>,
}

impl StartDriverTool {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for StartDriverTool {
    fn name(&self) -> &str {
        "alumnium_start_driver"
    }

    fn description(&self) -> &str {
        "Start a new browser or mobile driver and return its driver_id. \
         Use the driver_id with every other alumnium tool and call \
         alumnium_quit_driver when you are done."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![
            Property::string_enum(
                "platform",
                &Platform::ALL,
                "Platform to automate: chromium (local browser), android or ios (Appium)",
            ),
            Property::string(
                "url",
                "Page to open (chromium) or app path (ios); iOS opens Safari when omitted",
            )
            .optional(),
        ])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let platform = Platform::parse(&required_str(&input, "platform")?)?;
        let url = optional_str(&input, "url");

        let session = self.store.start(platform, url.as_deref()).await?;

        let mut output = json!({
            "driver_id": session.id,
            "platform": session.platform,
            "model": session.model,
        });
        if let Some(url) = session.url {
            output["url"] = json!(url);
        }
        ToolResult::json(&output)
    }
}

/// `alumnium_get_accessibility_tree`
pub struct AccessibilityTreeTool {
    store: Arc<SessionStore>,
}

impl AccessibilityTreeTool {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AccessibilityTreeTool {
    fn name(&self) -> &str {
        "alumnium_get_accessibility_tree"
    }

    fn description(&self) -> &str {
        "Return the accessibility tree of the current page or screen, \
         useful for debugging what the driver sees."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![Property::string("driver_id", "Driver ID from alumnium_start_driver")])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let driver_id = required_str(&input, "driver_id")?;

        let tree = self
            .store
            .with_session(&driver_id, |session| {
                Box::pin(async move { session.driver.accessibility_tree().await })
            })
            .await?;

        ToolResult::json(&json!({
            "driver_id": driver_id,
            "nodes": tree.len(),
            "tree": tree.to_text(),
        }))
    }
}

/// `alumnium_save_cache`
pub struct SaveCacheTool {
    store: Arc<SessionStore>,
}

impl SaveCacheTool {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveCacheTool {
    fn name(&self) -> &str {
        "alumnium_save_cache"
    }

    fn description(&self) -> &str {
        "Persist the interactions this driver has learned so later runs can \
         replay them without asking the model again."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![Property::string("driver_id", "Driver ID from alumnium_start_driver")])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let driver_id = required_str(&input, "driver_id")?;

        let path = self
            .store
            .with_session(&driver_id, |session| {
                Box::pin(async move { session.interpreter.save_cache().await })
            })
            .await?;

        let mut output = json!({
            "driver_id": driver_id,
            "saved": path.is_some(),
        });
        if let Some(path) = path {
            info!(driver_id = %driver_id, path = %path.display(), "Cache saved");
            output["path"] = json!(path.display().to_string());
        }
        ToolResult::json(&output)
    }
}

/// `alumnium_quit_driver`
pub struct QuitDriverTool {
    store: Arc<SessionStore>,
}

impl QuitDriverTool {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for QuitDriverTool {
    fn name(&self) -> &str {
        "alumnium_quit_driver"
    }

    fn description(&self) -> &str {
        "Close the driver and release its browser or device session. \
         The driver_id and all of its areas become invalid."
    }

    fn input_schema(&self) -> Value {
        SchemaBuilder::object(vec![Property::string("driver_id", "Driver ID to close")])
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let driver_id = required_str(&input, "driver_id")?;
        self.store.quit(&driver_id).await?;

        ToolResult::json(&json!({
            "driver_id": driver_id,
            "status": "closed",
        }))
    }
}

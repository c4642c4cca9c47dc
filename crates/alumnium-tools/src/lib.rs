//! alumnium-tools: the Alumnium MCP tool catalog
//!
//! Every tool shares one [`SessionStore`]; register them all with
//! [`register_alumnium_tools`].

use std::sync::Arc;

use alumnium_core::{SessionStore, ToolManager};

mod args;
pub mod actions;
pub mod driver;

pub use actions::{AreaTool, CheckTool, DoTool, GetTool, Target};
pub use driver::{AccessibilityTreeTool, QuitDriverTool, SaveCacheTool, StartDriverTool};

/// Register the full tool catalog, in listing order
pub fn register_alumnium_tools(manager: &mut ToolManager, store: Arc<SessionStore>) {
    manager.register(Arc::new(StartDriverTool::new(store.clone())));
    manager.register(Arc::new(DoTool::new(store.clone(), Target::Driver)));
    manager.register(Arc::new(CheckTool::new(store.clone(), Target::Driver)));
    manager.register(Arc::new(GetTool::new(store.clone(), Target::Driver)));
    manager.register(Arc::new(AreaTool::new(store.clone())));
    manager.register(Arc::new(DoTool::new(store.clone(), Target::Area)));
    manager.register(Arc::new(CheckTool::new(store.clone(), Target::Area)));
    manager.register(Arc::new(GetTool::new(store.clone(), Target::Area)));
    manager.register(Arc::new(AccessibilityTreeTool::new(store.clone())));
    manager.register(Arc::new(QuitDriverTool::new(store.clone())));
    manager.register(Arc::new(SaveCacheTool::new(store)));
}

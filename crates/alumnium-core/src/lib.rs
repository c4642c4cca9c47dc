//! alumnium-core: Alumnium MCP core library
//!
//! Session registry, driver and interpreter abstractions, the language model
//! client and the tool system shared by the rest of the workspace.

pub mod accessibility;
pub mod config;
pub mod driver;
pub mod error;
pub mod interpreter;
pub mod llm;
pub mod session;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use accessibility::{AccessibilityTree, AxNode};
pub use config::{AppiumConfig, CacheConfig, ChromiumConfig, Config, ModelSpec, Provider};
pub use driver::{Driver, DriverAction, DriverFactory, Platform};
pub use error::{Error, Result};
pub use interpreter::{
    ActOutcome, AreaScope, Interpreter, InterpreterFactory, ModelInterpreter,
    ModelInterpreterFactory, Verdict,
};
pub use llm::{LanguageModel, LlmClient};
pub use session::{Area, DriverSession, SessionInfo, SessionStore};
pub use tool::{Property, SchemaBuilder, Tool, ToolDefinition, ToolManager, ToolResult};

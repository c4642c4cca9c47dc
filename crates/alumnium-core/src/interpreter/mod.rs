//! Natural-language interpretation
//!
//! The dispatcher treats understanding "click the login button" or "the
//! title contains Dashboard" as an opaque capability behind [`Interpreter`].
//! Each session owns one interpreter, created by an [`InterpreterFactory`].

mod cache;
mod model;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

use crate::config::ModelSpec;
use crate::driver::{Driver, DriverAction};
use crate::Result;

pub use cache::InstructionCache;
pub use model::{ModelInterpreter, ModelInterpreterFactory};

/// Sub-region of the current view that area operations are confined to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaScope {
    /// Accessibility node the area is rooted at
    pub root: u32,
    pub description: String,
}

/// What `do` ended up doing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActOutcome {
    pub steps: Vec<DriverAction>,
    /// Steps were replayed from the instruction cache
    pub cached: bool,
}

/// Outcome of a `check`; a failed statement is a verdict, not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub explanation: String,
}

/// Resolves natural-language instructions against a driver
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Plan and execute the steps needed to reach `goal`
    async fn act(
        &self,
        driver: &dyn Driver,
        goal: &str,
        scope: Option<&AreaScope>,
    ) -> Result<ActOutcome>;

    /// Decide whether `statement` holds for the current view
    async fn check(
        &self,
        driver: &dyn Driver,
        statement: &str,
        vision: bool,
        scope: Option<&AreaScope>,
    ) -> Result<Verdict>;

    /// Extract the data described by `data`
    async fn get(
        &self,
        driver: &dyn Driver,
        data: &str,
        vision: bool,
        scope: Option<&AreaScope>,
    ) -> Result<JsonValue>;

    /// Find the region matching `description`
    async fn locate_area(&self, driver: &dyn Driver, description: &str) -> Result<AreaScope>;

    /// Persist learned interactions; returns where they were written, if anywhere
    async fn save_cache(&self) -> Result<Option<PathBuf>>;

    /// Called once when the owning session quits, before its driver closes
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds one interpreter per session
pub trait InterpreterFactory: Send + Sync {
    /// Create an interpreter for `model`; credential problems surface here,
    /// before any driver is launched
    fn create(&self, model: &ModelSpec) -> Result<Box<dyn Interpreter>>;
}

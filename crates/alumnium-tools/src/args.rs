//! Argument extraction shared by the tools
//!
//! Schemas are validated before `execute` runs, so these only guard against
//! direct calls that bypass the manager.

use alumnium_core::{Error, Result};
use serde_json::Value;

pub(crate) fn required_str(input: &Value, name: &str) -> Result<String> {
    input[name]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_argument(name, "a string"))
}

pub(crate) fn optional_str(input: &Value, name: &str) -> Option<String> {
    input[name]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn flag(input: &Value, name: &str) -> bool {
    input[name].as_bool().unwrap_or(false)
}

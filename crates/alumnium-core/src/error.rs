//! Error types for alumnium-core

use thiserror::Error;

/// Main error type for alumnium-core
///
/// Every variant maps onto a stable [`Error::category`] string so that tool
/// failures can be reported to MCP clients as structured results.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Driver {0} not found. Call alumnium_start_driver first.")]
    SessionNotFound(String),

    #[error("Area {0} not found. Call alumnium_area first.")]
    AreaNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Could not resolve action: {0}")]
    UnresolvedAction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable, machine-readable category of the failure
    pub fn category(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::AreaNotFound(_) => "area_not_found",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::UnsupportedPlatform(_) => "unsupported_platform",
            Self::NotImplemented(_) => "not_implemented",
            Self::Driver(_) => "driver",
            Self::Timeout(_) => "timeout",
            Self::Model(_) => "model",
            Self::Auth(_) => "authentication",
            Self::UnresolvedAction(_) => "unresolved_action",
            Self::Config(_) => "configuration",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Http(_) => "transport",
            Self::Json(_) => "serialization",
            Self::Io(_) => "io",
        }
    }

    /// Shorthand for a missing or mistyped tool argument
    pub fn invalid_argument(name: &str, expected: &str) -> Self {
        Self::InvalidArguments(format!("'{}' must be {}", name, expected))
    }
}

/// Result type alias for alumnium-core
pub type Result<T> = std::result::Result<T, Error>;

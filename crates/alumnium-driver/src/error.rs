//! Error types for alumnium-driver

use thiserror::Error;

/// alumnium-driver error type
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element [{0}] not found; take a fresh accessibility tree")]
    ElementNotFound(u32),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Driver has been closed")]
    Closed,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not supported on this platform: {0}")]
    Unsupported(String),

    #[error("Appium error ({status}): {error}: {message}")]
    Remote {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Malformed Appium response: {0}")]
    Protocol(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DriverError>;

impl From<DriverError> for alumnium_core::Error {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Timeout(msg) => Self::Timeout(msg),
            DriverError::Unsupported(msg) => Self::NotImplemented(msg),
            DriverError::Http(e) if e.is_timeout() => Self::Timeout(e.to_string()),
            DriverError::Http(e) => Self::Http(e),
            other => Self::Driver(other.to_string()),
        }
    }
}

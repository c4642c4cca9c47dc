//! Driver abstraction
//!
//! A driver is the per-session handle onto a browser or device. The dispatcher
//! never talks to a browser directly; it goes through [`Driver`] so that
//! Chromium, Appium and test fakes are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::accessibility::AccessibilityTree;
use crate::{Error, Result};

/// Automation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Chromium,
    Android,
    Ios,
}

impl Platform {
    /// Values accepted by `alumnium_start_driver`
    pub const ALL: [&'static str; 3] = ["chromium", "android", "ios"];

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "chromium" => Ok(Self::Chromium),
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(Error::UnsupportedPlatform(format!(
                "{} (expected one of: {})",
                other,
                Self::ALL.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive action a driver knows how to replay.
///
/// Element targets are accessibility node ids from the latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DriverAction {
    Click { id: u32 },
    Type { id: u32, text: String },
    PressKey { key: String },
    Hover { id: u32 },
    Select { id: u32, option: String },
    Navigate { url: String },
}

impl DriverAction {
    /// Node the action targets, if any
    pub fn target(&self) -> Option<u32> {
        match self {
            Self::Click { id }
            | Self::Type { id, .. }
            | Self::Hover { id }
            | Self::Select { id, .. } => Some(*id),
            Self::PressKey { .. } | Self::Navigate { .. } => None,
        }
    }
}

impl fmt::Display for DriverAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click { id } => write!(f, "click [{}]", id),
            Self::Type { id, text } => write!(f, "type \"{}\" into [{}]", text, id),
            Self::PressKey { key } => write!(f, "press {}", key),
            Self::Hover { id } => write!(f, "hover [{}]", id),
            Self::Select { id, option } => write!(f, "select \"{}\" in [{}]", option, id),
            Self::Navigate { url } => write!(f, "navigate to {}", url),
        }
    }
}

/// Browser / device handle owned by one session
#[async_trait]
pub trait Driver: Send + Sync {
    fn platform(&self) -> Platform;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Snapshot the current view; node ids stay valid until the next snapshot
    async fn accessibility_tree(&self) -> Result<AccessibilityTree>;

    /// PNG screenshot of the current view
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn perform(&self, action: &DriverAction) -> Result<()>;

    async fn title(&self) -> Result<String>;

    async fn url(&self) -> Result<String>;

    /// Release the underlying browser process or remote session.
    ///
    /// Must be idempotent.
    async fn quit(&self) -> Result<()>;
}

/// Launches drivers for `alumnium_start_driver`
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Launch a driver; `url` is the start page (or app path on mobile)
    async fn launch(&self, platform: Platform, url: Option<&str>) -> Result<Box<dyn Driver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("chromium").unwrap(), Platform::Chromium);
        assert_eq!(Platform::parse("ios").unwrap(), Platform::Ios);

        let err = Platform::parse("firefox").unwrap_err();
        assert_eq!(err.category(), "unsupported_platform");
        assert!(err.to_string().contains("chromium, android, ios"));
    }

    #[test]
    fn test_action_serde() {
        let action: DriverAction =
            serde_json::from_str(r#"{"action": "type", "id": 7, "text": "buy milk"}"#).unwrap();
        assert_eq!(
            action,
            DriverAction::Type {
                id: 7,
                text: "buy milk".to_string()
            }
        );
        assert_eq!(action.target(), Some(7));

        let key: DriverAction =
            serde_json::from_str(r#"{"action": "press_key", "key": "Enter"}"#).unwrap();
        assert_eq!(key.target(), None);
        assert_eq!(key.to_string(), "press Enter");
    }
}

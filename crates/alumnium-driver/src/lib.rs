//! alumnium-driver: browser and device drivers for alumnium-mcp
//!
//! - [`ChromiumDriver`]: local Chromium through the `headless_chrome` crate
//! - [`AppiumDriver`]: iOS (XCUITest) through an Appium server
//! - [`DefaultDriverFactory`]: picks one per platform

pub mod appium;
pub mod chromium;
pub mod error;
pub mod factory;

pub use appium::AppiumDriver;
pub use chromium::ChromiumDriver;
pub use error::{DriverError, Result};
pub use factory::DefaultDriverFactory;

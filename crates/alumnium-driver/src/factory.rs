//! Platform dispatch for `alumnium_start_driver`

use async_trait::async_trait;
use tracing::info;

use alumnium_core::config::{AppiumConfig, ChromiumConfig, Config};
use alumnium_core::driver::{Driver, DriverFactory, Platform};
use alumnium_core::{Error, Result};

use crate::appium::AppiumDriver;
use crate::chromium::ChromiumDriver;
use crate::error::DriverError;

/// Launches real drivers from configuration
#[derive(Debug, Clone, Default)]
pub struct DefaultDriverFactory {
    chromium: ChromiumConfig,
    appium: AppiumConfig,
}

impl DefaultDriverFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            chromium: config.chromium.clone(),
            appium: config.appium.clone(),
        }
    }
}

#[async_trait]
impl DriverFactory for DefaultDriverFactory {
    async fn launch(&self, platform: Platform, url: Option<&str>) -> Result<Box<dyn Driver>> {
        info!(platform = %platform, "Launching driver");

        match platform {
            Platform::Chromium => {
                let config = self.chromium.clone();
                let driver = tokio::task::spawn_blocking(move || ChromiumDriver::launch(&config))
                    .await
                    .map_err(|e| DriverError::Launch(format!("launch task failed: {}", e)))??;
                Ok(Box::new(driver))
            }
            Platform::Ios => {
                let driver = AppiumDriver::connect(&self.appium, url).await?;
                Ok(Box::new(driver))
            }
            Platform::Android => Err(Error::NotImplemented(
                "Platform android requires Appium setup. Not yet implemented.".to_string(),
            )),
        }
    }
}

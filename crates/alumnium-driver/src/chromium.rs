//! Local Chromium driver
//!
//! Wraps a `headless_chrome` browser with a single tab. The crate's API is
//! blocking, so every call runs on the blocking pool. Elements are addressed
//! through the `data-alumnium-id` attribute the snapshot script assigns.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptionsBuilder, Tab, protocol::cdp::Page};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use alumnium_core::accessibility::{AccessibilityTree, AxNode};
use alumnium_core::config::ChromiumConfig;
use alumnium_core::driver::{Driver, DriverAction, Platform};

use crate::error::{DriverError, Result};

const SNAPSHOT_SCRIPT: &str = include_str!("snapshot.js");

const CLEAR_VALUE_FN: &str = "function() { if ('value' in this) { this.value = ''; } }";

const SELECT_OPTION_FN: &str = "function(option) {
    const match = Array.from(this.options || [])
        .find((o) => o.text.trim() === option || o.value === option);
    if (!match) { return false; }
    this.value = match.value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}";

/// Idle connections are kept for the lifetime of a session
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

struct Running {
    browser: Browser,
    tab: Arc<Tab>,
}

/// Chromium driven over the DevTools protocol
pub struct ChromiumDriver {
    running: Mutex<Option<Running>>,
}

/// Command-line switches passed to Chromium
fn chrome_args(config: &ChromiumConfig) -> Vec<String> {
    vec![
        format!("--window-size={},{}", config.width, config.height),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
    ]
}

fn selector(id: u32) -> String {
    format!("[data-alumnium-id=\"{}\"]", id)
}

fn find(tab: &Tab, id: u32) -> Result<Element<'_>> {
    tab.find_element(&selector(id))
        .map_err(|_| DriverError::ElementNotFound(id))
}

/// Turn the snapshot script's JSON string into a tree
fn parse_snapshot(value: Option<JsonValue>) -> Result<AccessibilityTree> {
    let raw = match value {
        Some(JsonValue::String(raw)) => raw,
        other => {
            return Err(DriverError::Script(format!(
                "snapshot returned {:?} instead of a JSON string",
                other
            )));
        }
    };

    let nodes: Vec<AxNode> = serde_json::from_str(&raw)
        .map_err(|e| DriverError::Script(format!("invalid snapshot: {}", e)))?;
    AccessibilityTree::from_nodes(nodes).map_err(|e| DriverError::Script(e.to_string()))
}

fn navigate_tab(tab: &Tab, url: &str) -> Result<()> {
    tab.navigate_to(url)
        .map_err(|e| DriverError::Navigation(format!("Failed to navigate to {}: {}", url, e)))?;
    tab.wait_until_navigated()
        .map_err(|e| DriverError::Timeout(format!("{} did not finish loading: {}", url, e)))?;
    Ok(())
}

fn perform_on_tab(tab: &Tab, action: &DriverAction) -> Result<()> {
    let interaction = |e: anyhow::Error| DriverError::Interaction(format!("{}: {}", action, e));

    match action {
        DriverAction::Click { id } => {
            find(tab, *id)?.click().map_err(interaction)?;
        }
        DriverAction::Type { id, text } => {
            let element = find(tab, *id)?;
            element.click().map_err(interaction)?;
            element
                .call_js_fn(CLEAR_VALUE_FN, vec![], false)
                .map_err(interaction)?;
            tab.type_str(text).map_err(interaction)?;
        }
        DriverAction::PressKey { key } => {
            tab.press_key(key).map_err(interaction)?;
        }
        DriverAction::Hover { id } => {
            find(tab, *id)?.move_mouse_over().map_err(interaction)?;
        }
        DriverAction::Select { id, option } => {
            let selected = find(tab, *id)?
                .call_js_fn(SELECT_OPTION_FN, vec![json!(option)], false)
                .map_err(interaction)?;
            if selected.value != Some(JsonValue::Bool(true)) {
                return Err(DriverError::Interaction(format!(
                    "option \"{}\" not found in [{}]",
                    option, id
                )));
            }
        }
        DriverAction::Navigate { url } => navigate_tab(tab, url)?,
    }
    Ok(())
}

impl ChromiumDriver {
    /// Launch a browser and open its working tab. Blocks until Chromium is up.
    pub fn launch(config: &ChromiumConfig) -> Result<Self> {
        info!(headless = config.headless, "Launching Chromium");

        let args = chrome_args(config);
        let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptionsBuilder::default()
            .headless(config.headless)
            .path(config.executable.clone())
            .window_size(Some((config.width, config.height)))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(os_args)
            .build()
            .map_err(|e| DriverError::Launch(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| DriverError::Launch(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| DriverError::Launch(format!("Failed to open tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.navigation_timeout));

        info!("Chromium launched");

        Ok(Self {
            running: Mutex::new(Some(Running { browser, tab })),
        })
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        self.running()
            .as_ref()
            .map(|running| running.tab.clone())
            .ok_or(DriverError::Closed)
    }

    /// Run a blocking tab operation off the async runtime
    async fn on_tab<T, F>(&self, f: F) -> alumnium_core::Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab()?;
        let result = tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| DriverError::Interaction(format!("browser task failed: {}", e)))?;
        Ok(result?)
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    fn platform(&self) -> Platform {
        Platform::Chromium
    }

    async fn navigate(&self, url: &str) -> alumnium_core::Result<()> {
        info!(url, "Navigating");
        let url = url.to_string();
        self.on_tab(move |tab| navigate_tab(tab, &url)).await
    }

    async fn accessibility_tree(&self) -> alumnium_core::Result<AccessibilityTree> {
        let tree = self
            .on_tab(|tab| {
                let result = tab
                    .evaluate(SNAPSHOT_SCRIPT, false)
                    .map_err(|e| DriverError::Script(e.to_string()))?;
                parse_snapshot(result.value)
            })
            .await?;
        debug!(nodes = tree.len(), "Captured accessibility tree");
        Ok(tree)
    }

    async fn screenshot(&self) -> alumnium_core::Result<Vec<u8>> {
        let png = self
            .on_tab(|tab| {
                tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
                    .map_err(|e| DriverError::Screenshot(e.to_string()))
            })
            .await?;
        debug!(bytes = png.len(), "Screenshot captured");
        Ok(png)
    }

    async fn perform(&self, action: &DriverAction) -> alumnium_core::Result<()> {
        debug!(action = %action, "Performing action");
        let action = action.clone();
        self.on_tab(move |tab| perform_on_tab(tab, &action)).await
    }

    async fn title(&self) -> alumnium_core::Result<String> {
        self.on_tab(|tab| {
            tab.get_title()
                .map_err(|e| DriverError::Script(format!("Failed to read title: {}", e)))
        })
        .await
    }

    async fn url(&self) -> alumnium_core::Result<String> {
        self.on_tab(|tab| Ok(tab.get_url())).await
    }

    async fn quit(&self) -> alumnium_core::Result<()> {
        let Some(running) = self.running().take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || {
            if let Err(e) = running.tab.close(true) {
                warn!(error = %e, "Failed to close tab");
            }
            drop(running.browser);
        })
        .await
        .map_err(|e| DriverError::Interaction(format!("browser shutdown failed: {}", e)))?;

        info!("Chromium closed");
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .map(Option::take)
            .unwrap_or_else(|p| p.into_inner().take());
        if running.is_some() {
            info!("Closing browser session");
        }
    }
}

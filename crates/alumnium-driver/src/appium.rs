//! iOS driver speaking W3C WebDriver to an Appium server
//!
//! The XCUITest page source is parsed into an accessibility tree; every node
//! remembers its absolute XPath so actions can find it again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::{Client, Method};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, info, warn};

use alumnium_core::accessibility::{AccessibilityTree, AxNode};
use alumnium_core::config::AppiumConfig;
use alumnium_core::driver::{Driver, DriverAction, Platform};

use crate::error::{DriverError, Result};

const SAFARI_BUNDLE_ID: &str = "com.apple.mobilesafari";
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const ELEMENT_PREFIX: &str = "XCUIElementType";
/// Starting a simulator and WebDriverAgent can take minutes
const SESSION_TIMEOUT: Duration = Duration::from_secs(600);

/// W3C `newSession` payload for an XCUITest session
pub fn capabilities(config: &AppiumConfig, app: Option<&str>) -> JsonValue {
    let mut always = json!({
        "platformName": "iOS",
        "appium:automationName": "XCUITest",
        "appium:deviceName": config.device_name,
        "appium:platformVersion": config.platform_version,
        "appium:newCommandTimeout": config.new_command_timeout,
        "appium:wdaLaunchTimeout": config.wda_launch_timeout_ms,
    });

    match app {
        Some(app) => always["appium:app"] = json!(app.replace("file://", "")),
        None => always["appium:bundleId"] = json!(SAFARI_BUNDLE_ID),
    }

    json!({
        "capabilities": {
            "alwaysMatch": always,
            "firstMatch": [{}]
        }
    })
}

/// Remote XCUITest session
pub struct AppiumDriver {
    client: Client,
    server: String,
    session_id: String,
    /// node id -> absolute XPath, from the latest snapshot
    xpaths: Mutex<HashMap<u32, String>>,
    closed: AtomicBool,
}

impl AppiumDriver {
    /// Create a remote session; `app` is an app path, Safari when absent
    pub async fn connect(config: &AppiumConfig, app: Option<&str>) -> Result<Self> {
        let server = config.server_url.trim_end_matches('/').to_string();
        let client = Client::builder().timeout(SESSION_TIMEOUT).build()?;

        info!(server = %server, device = %config.device_name, "Creating Appium session");

        let response = client
            .post(format!("{}/session", server))
            .json(&capabilities(config, app))
            .send()
            .await?;
        let value = read_value(response).await?;

        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Protocol("newSession reply has no sessionId".to_string()))?
            .to_string();

        info!(session_id = %session_id, "Appium session created");

        Ok(Self {
            client,
            server,
            session_id,
            xpaths: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn xpaths(&self) -> MutexGuard<'_, HashMap<u32, String>> {
        self.xpaths.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Send a session-scoped command and return its `value`
    async fn command(&self, method: Method, path: &str, body: Option<JsonValue>) -> Result<JsonValue> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }

        let url = format!("{}/session/{}{}", self.server, self.session_id, path);
        debug!(method = %method, url = %url, "Appium command");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        read_value(request.send().await?).await
    }

    async fn element(&self, id: u32) -> Result<String> {
        let xpath = self
            .xpaths()
            .get(&id)
            .cloned()
            .ok_or(DriverError::ElementNotFound(id))?;

        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({"using": "xpath", "value": xpath})),
            )
            .await
            .map_err(|e| match e {
                DriverError::Remote { status: 404, .. } => DriverError::ElementNotFound(id),
                other => other,
            })?;
        element_id(&value)
    }

    async fn send_keys(&self, element: &str, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({"text": text})),
        )
        .await?;
        Ok(())
    }

    async fn perform_action(&self, action: &DriverAction) -> Result<()> {
        match action {
            DriverAction::Click { id } => {
                let element = self.element(*id).await?;
                self.command(Method::POST, &format!("/element/{}/click", element), Some(json!({})))
                    .await?;
            }
            DriverAction::Type { id, text } => {
                let element = self.element(*id).await?;
                self.command(Method::POST, &format!("/element/{}/clear", element), Some(json!({})))
                    .await?;
                self.send_keys(&element, text).await?;
            }
            DriverAction::PressKey { key } => {
                let active = self.command(Method::GET, "/element/active", None).await?;
                self.send_keys(&element_id(&active)?, &key_text(key)).await?;
            }
            DriverAction::Hover { .. } => {
                return Err(DriverError::Unsupported("hover on iOS".to_string()));
            }
            DriverAction::Select { id, option } => {
                let element = self.element(*id).await?;
                self.send_keys(&element, option).await?;
            }
            DriverAction::Navigate { url } => {
                self.command(Method::POST, "/url", Some(json!({"url": url}))).await?;
            }
        }
        Ok(())
    }
}

/// Unwrap a WebDriver response, turning error payloads into [`DriverError::Remote`]
async fn read_value(response: reqwest::Response) -> Result<JsonValue> {
    let status = response.status();
    let body: JsonValue = response
        .json()
        .await
        .map_err(|e| DriverError::Protocol(format!("response is not JSON: {}", e)))?;

    let value = body.get("value").cloned().unwrap_or(JsonValue::Null);
    if status.is_success() && value.get("error").is_none() {
        return Ok(value);
    }

    let error = value["error"].as_str().unwrap_or("unknown error").to_string();
    let message = value["message"].as_str().unwrap_or_default().to_string();
    warn!(status = status.as_u16(), error = %error, "Appium returned an error");

    if error == "timeout" || error == "script timeout" {
        return Err(DriverError::Timeout(message));
    }
    Err(DriverError::Remote {
        status: status.as_u16(),
        error,
        message,
    })
}

fn element_id(value: &JsonValue) -> Result<String> {
    value[ELEMENT_KEY]
        .as_str()
        .or_else(|| value["ELEMENT"].as_str())
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol(format!("no element reference in {}", value)))
}

/// Text XCUITest types for a named key
fn key_text(key: &str) -> String {
    match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => "\n".to_string(),
        "tab" => "\t".to_string(),
        "backspace" | "delete" => "\u{8}".to_string(),
        "space" => " ".to_string(),
        _ => key.to_string(),
    }
}

struct OpenElement {
    id: u32,
    xpath: String,
    child_counts: HashMap<String, usize>,
}

struct PageSourceBuilder {
    nodes: Vec<AxNode>,
    xpaths: HashMap<u32, String>,
    stack: Vec<OpenElement>,
    root_counts: HashMap<String, usize>,
    next_id: u32,
}

impl PageSourceBuilder {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            xpaths: HashMap::new(),
            stack: Vec::new(),
            root_counts: HashMap::new(),
            next_id: 1,
        }
    }

    /// Record an element; `has_children` keeps it open until its end tag
    fn open(&mut self, element: &BytesStart<'_>, has_children: bool) -> Result<()> {
        let tag = std::str::from_utf8(element.name().as_ref())
            .map_err(|e| DriverError::Protocol(format!("invalid tag name: {}", e)))?
            .to_string();

        let mut attrs: HashMap<String, String> = HashMap::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| DriverError::Protocol(format!("invalid attribute on <{}>: {}", tag, e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DriverError::Protocol(format!("invalid attribute value on <{}>: {}", tag, e)))?;
            attrs.insert(key, value.into_owned());
        }

        let position = {
            let counts = match self.stack.last_mut() {
                Some(parent) => &mut parent.child_counts,
                None => &mut self.root_counts,
            };
            let count = counts.entry(tag.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let xpath = format!(
            "{}/{}[{}]",
            self.stack.last().map(|p| p.xpath.as_str()).unwrap_or(""),
            tag,
            position
        );

        let id = self.next_id;
        self.next_id += 1;

        let role = tag.strip_prefix(ELEMENT_PREFIX).unwrap_or(&tag).to_lowercase();
        let name = attrs
            .get("label")
            .or_else(|| attrs.get("name"))
            .cloned()
            .unwrap_or_default();

        let mut node = AxNode::new(id, role, name.clone());
        if let Some(parent) = self.stack.last() {
            node = node.with_parent(parent.id);
        }
        if let Some(value) = attrs.get("value").filter(|v| **v != name) {
            node = node.with_value(value.clone());
        }
        for key in ["enabled", "visible", "selected"] {
            if let Some(flag) = attrs.get(key).filter(|v| *v == "false" || key == "selected") {
                node = node.with_attribute(key, flag.clone());
            }
        }

        self.nodes.push(node);
        self.xpaths.insert(id, xpath.clone());

        if has_children {
            self.stack.push(OpenElement {
                id,
                xpath,
                child_counts: HashMap::new(),
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        self.stack.pop();
    }

    fn finish(self) -> Result<(AccessibilityTree, HashMap<u32, String>)> {
        let tree = AccessibilityTree::from_nodes(self.nodes)
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        Ok((tree, self.xpaths))
    }
}

/// Parse XCUITest page source into a tree plus the XPath of every node
pub fn parse_page_source(xml: &str) -> Result<(AccessibilityTree, HashMap<u32, String>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = PageSourceBuilder::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => builder.open(e, true)?,
            Ok(Event::Empty(ref e)) => builder.open(e, false)?,
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DriverError::Protocol(format!(
                    "invalid page source at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    builder.finish()
}

#[async_trait]
impl Driver for AppiumDriver {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn navigate(&self, url: &str) -> alumnium_core::Result<()> {
        info!(url, "Navigating");
        self.command(Method::POST, "/url", Some(json!({"url": url})))
            .await?;
        Ok(())
    }

    async fn accessibility_tree(&self) -> alumnium_core::Result<AccessibilityTree> {
        let source = self.command(Method::GET, "/source", None).await?;
        let xml = source
            .as_str()
            .ok_or_else(|| DriverError::Protocol("page source is not a string".to_string()))?;

        let (tree, xpaths) = parse_page_source(xml)?;
        *self.xpaths() = xpaths;
        debug!(nodes = tree.len(), "Captured accessibility tree");
        Ok(tree)
    }

    async fn screenshot(&self) -> alumnium_core::Result<Vec<u8>> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Screenshot("screenshot is not a string".to_string()))?;
        let png = BASE64
            .decode(encoded.trim())
            .map_err(|e| DriverError::Screenshot(format!("invalid base64: {}", e)))?;
        Ok(png)
    }

    async fn perform(&self, action: &DriverAction) -> alumnium_core::Result<()> {
        debug!(action = %action, "Performing action");
        Ok(self.perform_action(action).await?)
    }

    async fn title(&self) -> alumnium_core::Result<String> {
        let value = self.command(Method::GET, "/title", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn url(&self) -> alumnium_core::Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn quit(&self) -> alumnium_core::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let url = format!("{}/session/{}", self.server, self.session_id);
        let response = self.client.delete(&url).send().await.map_err(DriverError::from)?;
        read_value(response).await?;

        info!(session_id = %self.session_id, "Appium session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SOURCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AppiumAUT>
  <XCUIElementTypeApplication type="XCUIElementTypeApplication" name="Settings" label="Settings" enabled="true" visible="true">
    <XCUIElementTypeButton type="XCUIElementTypeButton" name="General" label="General" enabled="true" visible="true"/>
    <XCUIElementTypeButton type="XCUIElementTypeButton" name="Privacy" label="Privacy &amp; Security" enabled="false" visible="true"/>
    <XCUIElementTypeTextField type="XCUIElementTypeTextField" name="Search" value="wifi" enabled="true" visible="true"/>
  </XCUIElementTypeApplication>
</AppiumAUT>"#;

    fn config(server: &str) -> AppiumConfig {
        AppiumConfig {
            server_url: server.to_string(),
            ..AppiumConfig::default()
        }
    }

    async fn connected(server: &MockServer) -> AppiumDriver {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {"sessionId": "s-1", "capabilities": {}}
            })))
            .mount(server)
            .await;
        AppiumDriver::connect(&config(&server.uri()), None).await.unwrap()
    }

    #[test]
    fn test_capabilities_default_to_safari() {
        let caps = capabilities(&AppiumConfig::default(), None);
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["appium:bundleId"], SAFARI_BUNDLE_ID);
        assert_eq!(always["appium:deviceName"], "iPhone 16");
        assert_eq!(always["appium:platformVersion"], "18.4");
        assert_eq!(always["appium:newCommandTimeout"], 300);
        assert_eq!(always["appium:wdaLaunchTimeout"], 90_000);
        assert!(always.get("appium:app").is_none());
    }

    #[test]
    fn test_capabilities_with_app_path() {
        let caps = capabilities(&AppiumConfig::default(), Some("file:///tmp/My.app"));
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["appium:app"], "/tmp/My.app");
        assert!(always.get("appium:bundleId").is_none());
    }

    #[test]
    fn test_parse_page_source() {
        let (tree, xpaths) = parse_page_source(SOURCE).unwrap();

        assert_eq!(tree.len(), 5);
        let app = tree.get(2).unwrap();
        assert_eq!(app.role, "application");
        assert_eq!(app.children, vec![3, 4, 5]);

        let privacy = tree.get(4).unwrap();
        assert_eq!(privacy.name, "Privacy & Security");
        assert_eq!(privacy.attributes["enabled"], "false");

        assert_eq!(tree.get(5).unwrap().value.as_deref(), Some("wifi"));
        assert_eq!(
            xpaths[&4],
            "/AppiumAUT[1]/XCUIElementTypeApplication[1]/XCUIElementTypeButton[2]"
        );
    }

    #[test]
    fn test_parse_page_source_entities_and_quoting() {
        let xml = r#"<AppiumAUT>
  <XCUIElementTypeAlert label="Don&#8217;t Allow">
    <XCUIElementTypeWindow name='w'>
      <XCUIElementTypeButton label='OK'/>
    </XCUIElementTypeWindow>
    <XCUIElementTypeButton label="Cancel"/>
  </XCUIElementTypeAlert>
</AppiumAUT>"#;

        let (tree, xpaths) = parse_page_source(xml).unwrap();

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.get(2).unwrap().name, "Don\u{2019}t Allow");

        let window = tree.get(3).unwrap();
        assert_eq!(window.role, "window");
        assert_eq!(window.name, "w");
        assert_eq!(window.children, vec![4]);

        let cancel = tree.get(5).unwrap();
        assert_eq!(cancel.parent, Some(2));
        assert_eq!(
            xpaths[&5],
            "/AppiumAUT[1]/XCUIElementTypeAlert[1]/XCUIElementTypeButton[1]"
        );
    }

    #[test]
    fn test_parse_page_source_rejects_malformed_xml() {
        let err = parse_page_source("<AppiumAUT><XCUIElementTypeButton></AppiumAUT>").unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[test]
    fn test_key_text() {
        assert_eq!(key_text("Enter"), "\n");
        assert_eq!(key_text("Tab"), "\t");
        assert_eq!(key_text("a"), "a");
    }

    #[tokio::test]
    async fn test_connect_and_click() {
        let server = MockServer::start().await;
        let driver = connected(&server).await;
        assert_eq!(driver.session_id(), "s-1");

        Mock::given(method("GET"))
            .and(path("/session/s-1/source"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": SOURCE})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/element"))
            .and(body_partial_json(json!({
                "using": "xpath",
                "value": "/AppiumAUT[1]/XCUIElementTypeApplication[1]/XCUIElementTypeButton[1]"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {ELEMENT_KEY: "el-7"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/element/el-7/click"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(&server)
            .await;

        let tree = driver.accessibility_tree().await.unwrap();
        assert_eq!(tree.get(3).unwrap().name, "General");

        driver.perform(&DriverAction::Click { id: 3 }).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_node_is_driver_error() {
        let server = MockServer::start().await;
        let driver = connected(&server).await;

        let err = driver.perform(&DriverAction::Click { id: 42 }).await.unwrap_err();
        assert_eq!(err.category(), "driver");
    }

    #[tokio::test]
    async fn test_remote_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": {"error": "session not created", "message": "Could not find device"}
            })))
            .mount(&server)
            .await;

        let err = AppiumDriver::connect(&config(&server.uri()), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::Remote { status: 500, .. }));
        assert!(err.to_string().contains("Could not find device"));
    }

    #[tokio::test]
    async fn test_screenshot_and_quit() {
        let server = MockServer::start().await;
        let driver = connected(&server).await;

        Mock::given(method("GET"))
            .and(path("/session/s-1/screenshot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": BASE64.encode(b"\x89PNG")
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/s-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(driver.screenshot().await.unwrap(), b"\x89PNG".to_vec());

        driver.quit().await.unwrap();
        driver.quit().await.unwrap();

        let err = driver.title().await.unwrap_err();
        assert_eq!(err.category(), "driver");
    }

    #[test]
    fn test_hover_is_not_implemented() {
        let err: alumnium_core::Error =
            DriverError::Unsupported("hover on iOS".to_string()).into();
        assert_eq!(err.category(), "not_implemented");
    }
}

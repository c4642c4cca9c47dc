//! In-process fakes for drivers and interpreters
//!
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates' tests.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::accessibility::{AccessibilityTree, AxNode};
use crate::config::ModelSpec;
use crate::driver::{Driver, DriverAction, DriverFactory, Platform};
use crate::interpreter::{ActOutcome, AreaScope, Interpreter, InterpreterFactory, Verdict};
use crate::{Error, Result};

/// Login form used as the default fake page
///
/// ```text
/// - document [id=1] "Login"
///   - textbox [id=2] "Username"
///   - textbox [id=3] "Password"
///   - button [id=4] "Sign in"
///   - navigation [id=5] "Main menu"
///     - link [id=6] "Home"
/// ```
pub fn login_page() -> AccessibilityTree {
    AccessibilityTree::from_nodes(vec![
        AxNode::new(1, "document", "Login"),
        AxNode::new(2, "textbox", "Username").with_parent(1),
        AxNode::new(3, "textbox", "Password").with_parent(1),
        AxNode::new(4, "button", "Sign in").with_parent(1),
        AxNode::new(5, "navigation", "Main menu").with_parent(1),
        AxNode::new(6, "link", "Home").with_parent(5),
    ])
    .expect("fixture ids are unique")
}

#[derive(Debug)]
struct FakeDriverState {
    url: String,
    tree: AccessibilityTree,
    performed: Vec<DriverAction>,
    navigations: Vec<String>,
    quit_calls: usize,
    fail_navigation: bool,
}

/// Scriptable driver; clones share state so tests can inspect a driver
/// after handing it to a session
#[derive(Debug, Clone)]
pub struct FakeDriver {
    platform: Platform,
    state: Arc<Mutex<FakeDriverState>>,
}

impl FakeDriver {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Arc::new(Mutex::new(FakeDriverState {
                url: "about:blank".to_string(),
                tree: login_page(),
                performed: Vec::new(),
                navigations: Vec::new(),
                quit_calls: 0,
                fail_navigation: false,
            })),
        }
    }

    pub fn with_tree(self, tree: AccessibilityTree) -> Self {
        self.state().tree = tree;
        self
    }

    /// Make every `navigate` call fail
    pub fn failing_navigation(self) -> Self {
        self.state().fail_navigation = true;
        self
    }

    pub fn performed(&self) -> Vec<DriverAction> {
        self.state().performed.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn quit_count(&self) -> usize {
        self.state().quit_calls
    }

    pub fn is_quit(&self) -> bool {
        self.quit_count() > 0
    }

    fn state(&self) -> MutexGuard<'_, FakeDriverState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn live_state(&self) -> Result<MutexGuard<'_, FakeDriverState>> {
        let state = self.state();
        if state.quit_calls > 0 {
            return Err(Error::Driver("browser has been closed".to_string()));
        }
        Ok(state)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.live_state()?;
        if state.fail_navigation {
            return Err(Error::Driver(format!(
                "navigation to {} failed: net::ERR_NAME_NOT_RESOLVED",
                url
            )));
        }
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn accessibility_tree(&self) -> Result<AccessibilityTree> {
        Ok(self.live_state()?.tree.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.live_state()?;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn perform(&self, action: &DriverAction) -> Result<()> {
        let mut state = self.live_state()?;
        if let Some(id) = action.target() {
            if !state.tree.contains(id) {
                return Err(Error::Driver(format!("element [{}] not found", id)));
            }
        }
        if let DriverAction::Navigate { url } = action {
            state.url = url.clone();
        }
        state.performed.push(action.clone());
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        let state = self.live_state()?;
        Ok(state
            .tree
            .roots()
            .next()
            .map(|root| root.name.clone())
            .unwrap_or_default())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.live_state()?.url.clone())
    }

    async fn quit(&self) -> Result<()> {
        self.state().quit_calls += 1;
        Ok(())
    }
}

/// Hands out [`FakeDriver`]s and remembers them
#[derive(Debug, Clone, Default)]
pub struct FakeDriverFactory {
    launched: Arc<Mutex<Vec<FakeDriver>>>,
    fail_navigation: bool,
}

impl FakeDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drivers launched by this factory cannot navigate
    pub fn failing_navigation() -> Self {
        Self {
            fail_navigation: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<FakeDriver> {
        self.launched
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl DriverFactory for FakeDriverFactory {
    async fn launch(&self, platform: Platform, _url: Option<&str>) -> Result<Box<dyn Driver>> {
        let mut driver = FakeDriver::new(platform);
        if self.fail_navigation {
            driver = driver.failing_navigation();
        }
        self.launched
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(driver.clone());
        Ok(Box::new(driver))
    }
}

/// Interpreter that matches instructions against element names
///
/// `act` clicks the first element whose name appears in the goal, `check`
/// passes when any element name appears in the statement, `get` returns the
/// title for "title" and the element names otherwise, and `locate_area`
/// picks the element named in the description.
#[derive(Debug, Default)]
pub struct FakeInterpreter {
    closed: Arc<AtomicUsize>,
}

impl FakeInterpreter {
    async fn scoped(driver: &dyn Driver, scope: Option<&AreaScope>) -> Result<AccessibilityTree> {
        let tree = driver.accessibility_tree().await?;
        match scope {
            Some(scope) => tree.subtree(scope.root).ok_or_else(|| {
                Error::UnresolvedAction(format!("area \"{}\" is gone", scope.description))
            }),
            None => Ok(tree),
        }
    }

    fn mentioned(tree: &AccessibilityTree, text: &str) -> Option<u32> {
        let text = text.to_lowercase();
        tree.nodes()
            .iter()
            .filter(|node| !node.name.is_empty())
            .find(|node| text.contains(&node.name.to_lowercase()))
            .map(|node| node.id)
    }
}

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn act(
        &self,
        driver: &dyn Driver,
        goal: &str,
        scope: Option<&AreaScope>,
    ) -> Result<ActOutcome> {
        let tree = Self::scoped(driver, scope).await?;
        let id = Self::mentioned(&tree, goal)
            .ok_or_else(|| Error::UnresolvedAction(format!("nothing matches \"{}\"", goal)))?;

        let step = DriverAction::Click { id };
        driver.perform(&step).await?;
        Ok(ActOutcome {
            steps: vec![step],
            cached: false,
        })
    }

    async fn check(
        &self,
        driver: &dyn Driver,
        statement: &str,
        _vision: bool,
        scope: Option<&AreaScope>,
    ) -> Result<Verdict> {
        let tree = Self::scoped(driver, scope).await?;
        Ok(match Self::mentioned(&tree, statement) {
            Some(id) => Verdict {
                passed: true,
                explanation: format!("element [{}] matches", id),
            },
            None => Verdict {
                passed: false,
                explanation: "no element matches the statement".to_string(),
            },
        })
    }

    async fn get(
        &self,
        driver: &dyn Driver,
        data: &str,
        _vision: bool,
        scope: Option<&AreaScope>,
    ) -> Result<JsonValue> {
        if data.to_lowercase().contains("title") {
            return Ok(json!(driver.title().await?));
        }
        let tree = Self::scoped(driver, scope).await?;
        let names: Vec<&str> = tree
            .nodes()
            .iter()
            .map(|node| node.name.as_str())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(json!(names))
    }

    async fn locate_area(&self, driver: &dyn Driver, description: &str) -> Result<AreaScope> {
        let tree = driver.accessibility_tree().await?;
        let root = Self::mentioned(&tree, description)
            .ok_or_else(|| Error::UnresolvedAction(format!("no area matches \"{}\"", description)))?;
        Ok(AreaScope {
            root,
            description: description.to_string(),
        })
    }

    async fn save_cache(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Creates [`FakeInterpreter`]s, or fails like a missing API key would
#[derive(Debug, Default)]
pub struct FakeInterpreterFactory {
    fail_auth: bool,
    created: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeInterpreterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_auth() -> Self {
        Self {
            fail_auth: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Interpreters closed by their session's quit
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl InterpreterFactory for FakeInterpreterFactory {
    fn create(&self, model: &ModelSpec) -> Result<Box<dyn Interpreter>> {
        if self.fail_auth {
            return Err(Error::Auth(format!(
                "API key is not set for model {}",
                model.id()
            )));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInterpreter {
            closed: self.closed.clone(),
        }))
    }
}

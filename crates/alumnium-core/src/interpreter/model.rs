//! Language-model backed interpreter
//!
//! Sends the (scoped) accessibility tree and the instruction to the
//! configured model and expects a JSON reply. Reasoning stays with the model;
//! this side only validates replies against the tree and replays actions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::{ActOutcome, AreaScope, InstructionCache, Interpreter, InterpreterFactory, Verdict};
use crate::accessibility::AccessibilityTree;
use crate::config::{CacheConfig, Config, ModelSpec};
use crate::driver::{Driver, DriverAction};
use crate::llm::{ImageSource, LanguageModel, LlmClient, Message, MessagesRequest};
use crate::{Error, Result};

const DEFAULT_MAX_TOKENS: u64 = 2048;

const ACT_SYSTEM: &str = "You control a browser or mobile app through its accessibility tree. \
Each element is shown as `- role [id=N] \"name\"`. Plan the smallest sequence of actions that \
achieves the user's goal. Reply with JSON only: {\"steps\": [...], \"explanation\": \"...\"}. \
Each step is one of {\"action\": \"click\", \"id\": N}, {\"action\": \"type\", \"id\": N, \
\"text\": \"...\"}, {\"action\": \"press_key\", \"key\": \"Enter\"}, {\"action\": \"hover\", \
\"id\": N}, {\"action\": \"select\", \"id\": N, \"option\": \"...\"}, {\"action\": \"navigate\", \
\"url\": \"...\"}. Only use ids that appear in the tree. If the goal cannot be achieved, reply \
with an empty steps list and explain why.";

const CHECK_SYSTEM: &str = "You verify statements about a browser or mobile app screen using \
its accessibility tree (and a screenshot when provided). Reply with JSON only: \
{\"result\": true|false, \"explanation\": \"...\"}.";

const GET_SYSTEM: &str = "You extract data from a browser or mobile app screen using its \
accessibility tree (and a screenshot when provided). Reply with JSON only: {\"value\": ...}. \
Use a number, boolean, string or list as appropriate, or null when the data is not present.";

const AREA_SYSTEM: &str = "You locate regions of a browser or mobile app screen in its \
accessibility tree. Reply with JSON only: {\"id\": N, \"explanation\": \"...\"} where N is the \
id of the element that contains the described region, or {\"id\": null, \"explanation\": \
\"...\"} if there is no such region.";

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    steps: Vec<DriverAction>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckReply {
    result: bool,
    #[serde(default)]
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct GetReply {
    #[serde(default)]
    value: JsonValue,
}

#[derive(Debug, Deserialize)]
struct AreaReply {
    id: Option<u32>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Interpreter that delegates every decision to a [`LanguageModel`]
pub struct ModelInterpreter {
    model: Arc<dyn LanguageModel>,
    cache: Option<Mutex<InstructionCache>>,
    max_tokens: u64,
}

impl ModelInterpreter {
    /// Create an interpreter; `cache` of `None` disables instruction caching
    pub fn new(model: Arc<dyn LanguageModel>, cache: Option<InstructionCache>) -> Self {
        Self {
            model,
            cache: cache.map(Mutex::new),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    fn with_cache<R>(&self, f: impl FnOnce(&mut InstructionCache) -> R) -> Option<R> {
        self.cache
            .as_ref()
            .map(|cache| f(&mut cache.lock().unwrap_or_else(|p| p.into_inner())))
    }

    async fn scoped_tree(
        &self,
        driver: &dyn Driver,
        scope: Option<&AreaScope>,
    ) -> Result<AccessibilityTree> {
        let tree = driver.accessibility_tree().await?;
        match scope {
            None => Ok(tree),
            Some(scope) => tree.subtree(scope.root).ok_or_else(|| {
                Error::UnresolvedAction(format!(
                    "area \"{}\" is no longer present on the page",
                    scope.description
                ))
            }),
        }
    }

    /// Send one prompt and parse the JSON object in the reply
    async fn ask(&self, system: &str, prompt: String, screenshot: Option<Vec<u8>>) -> Result<JsonValue> {
        let message = match screenshot {
            Some(png) => Message::user_with_image(prompt, ImageSource::png(&png)),
            None => Message::user(prompt),
        };

        let request = MessagesRequest {
            model: String::new(),
            max_tokens: self.max_tokens,
            system: Some(system.to_string()),
            messages: vec![message],
            temperature: Some(0.0),
        };

        let response = self.model.complete(request).await?;
        let text = response.text();
        debug!(model = %self.model.model_id(), reply_len = text.len(), "Model replied");
        extract_json(&text)
    }

    /// Title and URL header; native views without them get an empty header
    async fn page_context(&self, driver: &dyn Driver) -> String {
        let title = driver.title().await.ok().filter(|t| !t.is_empty());
        let url = driver.url().await.ok().filter(|u| !u.is_empty());
        match (title, url) {
            (Some(title), Some(url)) => format!("Page: {} ({})\n", title, url),
            (Some(page), None) | (None, Some(page)) => format!("Page: {}\n", page),
            (None, None) => String::new(),
        }
    }

    async fn screenshot_if(&self, driver: &dyn Driver, vision: bool) -> Result<Option<Vec<u8>>> {
        if vision {
            Ok(Some(driver.screenshot().await?))
        } else {
            Ok(None)
        }
    }

    fn cached_plan(&self, key: &str, tree: &AccessibilityTree) -> Option<Vec<DriverAction>> {
        self.with_cache(|cache| cache.get(key).map(<[DriverAction]>::to_vec))
            .flatten()
            .filter(|steps| !steps.is_empty() && unknown_target(steps, tree).is_none())
    }
}

fn unknown_target<'a>(steps: &'a [DriverAction], tree: &AccessibilityTree) -> Option<&'a DriverAction> {
    steps
        .iter()
        .find(|step| step.target().is_some_and(|id| !tree.contains(id)))
}

fn parse_reply<T: for<'de> Deserialize<'de>>(value: JsonValue, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::Model(format!("malformed {} reply: {}", what, e)))
}

/// Pull the JSON object out of a model reply, tolerating code fences and prose
fn extract_json(text: &str) -> Result<JsonValue> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Ok(value);
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| Error::Model(format!("reply is not valid JSON: {}", e))),
        _ => Err(Error::Model(format!(
            "reply contains no JSON object: {}",
            truncate(trimmed, 200)
        ))),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Interpreter for ModelInterpreter {
    async fn act(
        &self,
        driver: &dyn Driver,
        goal: &str,
        scope: Option<&AreaScope>,
    ) -> Result<ActOutcome> {
        let tree = self.scoped_tree(driver, scope).await?;
        let key = InstructionCache::key(goal, &tree.fingerprint());

        if let Some(steps) = self.cached_plan(&key, &tree) {
            debug!(goal, steps = steps.len(), "Replaying cached plan");
            for step in &steps {
                driver.perform(step).await?;
            }
            return Ok(ActOutcome {
                steps,
                cached: true,
            });
        }

        let prompt = format!(
            "{}Accessibility tree:\n{}\nGoal: {}",
            self.page_context(driver).await,
            tree.to_text(),
            goal
        );
        let plan: PlanReply = parse_reply(self.ask(ACT_SYSTEM, prompt, None).await?, "plan")?;

        if plan.steps.is_empty() {
            return Err(Error::UnresolvedAction(match plan.explanation {
                Some(why) if !why.is_empty() => format!("no actions found for \"{}\": {}", goal, why),
                _ => format!("no actions found for \"{}\"", goal),
            }));
        }

        if let Some(step) = unknown_target(&plan.steps, &tree) {
            return Err(Error::UnresolvedAction(format!(
                "step \"{}\" targets an element that is not on the page",
                step
            )));
        }

        for step in &plan.steps {
            debug!(step = %step, "Performing step");
            driver.perform(step).await?;
        }

        self.with_cache(|cache| cache.insert(key, plan.steps.clone()));
        info!(goal, steps = plan.steps.len(), "Goal completed");

        Ok(ActOutcome {
            steps: plan.steps,
            cached: false,
        })
    }

    async fn check(
        &self,
        driver: &dyn Driver,
        statement: &str,
        vision: bool,
        scope: Option<&AreaScope>,
    ) -> Result<Verdict> {
        let tree = self.scoped_tree(driver, scope).await?;
        let screenshot = self.screenshot_if(driver, vision).await?;
        let prompt = format!(
            "{}Accessibility tree:\n{}\nStatement: {}",
            self.page_context(driver).await,
            tree.to_text(),
            statement
        );

        let reply: CheckReply = parse_reply(self.ask(CHECK_SYSTEM, prompt, screenshot).await?, "check")?;
        Ok(Verdict {
            passed: reply.result,
            explanation: reply.explanation,
        })
    }

    async fn get(
        &self,
        driver: &dyn Driver,
        data: &str,
        vision: bool,
        scope: Option<&AreaScope>,
    ) -> Result<JsonValue> {
        let tree = self.scoped_tree(driver, scope).await?;
        let screenshot = self.screenshot_if(driver, vision).await?;
        let prompt = format!(
            "{}Accessibility tree:\n{}\nData to extract: {}",
            self.page_context(driver).await,
            tree.to_text(),
            data
        );

        let reply: GetReply = parse_reply(self.ask(GET_SYSTEM, prompt, screenshot).await?, "get")?;
        Ok(reply.value)
    }

    async fn locate_area(&self, driver: &dyn Driver, description: &str) -> Result<AreaScope> {
        let tree = driver.accessibility_tree().await?;
        let prompt = format!(
            "{}Accessibility tree:\n{}\nRegion: {}",
            self.page_context(driver).await,
            tree.to_text(),
            description
        );

        let reply: AreaReply = parse_reply(self.ask(AREA_SYSTEM, prompt, None).await?, "area")?;
        match reply.id {
            Some(root) if tree.contains(root) => Ok(AreaScope {
                root,
                description: description.to_string(),
            }),
            Some(root) => Err(Error::UnresolvedAction(format!(
                "area \"{}\" resolved to element [{}] which is not on the page",
                description, root
            ))),
            None => Err(Error::UnresolvedAction(format!(
                "no area matches \"{}\"{}",
                description,
                reply
                    .explanation
                    .map(|why| format!(": {}", why))
                    .unwrap_or_default()
            ))),
        }
    }

    async fn save_cache(&self) -> Result<Option<PathBuf>> {
        self.with_cache(InstructionCache::save)
            .transpose()
            .map(Option::flatten)
    }

    /// Flush plans learned since the last save
    async fn close(&self) -> Result<()> {
        let saved = self.with_cache(|cache| {
            if cache.is_dirty() {
                cache.save()
            } else {
                Ok(None)
            }
        });
        if let Some(path) = saved.transpose()?.flatten() {
            info!(path = %path.display(), "Flushed instruction cache");
        }
        Ok(())
    }
}

/// Builds a [`ModelInterpreter`] backed by an [`LlmClient`] per session
#[derive(Debug, Clone)]
pub struct ModelInterpreterFactory {
    timeout: Duration,
    cache: CacheConfig,
}

impl ModelInterpreterFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.request_timeout),
            cache: config.cache.clone(),
        }
    }

    /// Cache file shared by every session using `model`
    pub fn cache_path(&self, model: &ModelSpec) -> PathBuf {
        let file: String = model
            .id()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.cache.dir.join(format!("{}.json", file))
    }
}

impl InterpreterFactory for ModelInterpreterFactory {
    fn create(&self, model: &ModelSpec) -> Result<Box<dyn Interpreter>> {
        let client = LlmClient::new(model, self.timeout)?;
        let cache = self
            .cache
            .enabled
            .then(|| InstructionCache::load(self.cache_path(model)));

        Ok(Box::new(ModelInterpreter::new(Arc::new(client), cache)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessagesResponse;
    use crate::llm::MessageContent;
    use crate::accessibility::AxNode;
    use crate::testing::FakeDriver;
    use crate::Platform;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Model that answers with canned replies in order
    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        requests: Mutex<Vec<MessagesRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> MessagesRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_id(&self) -> String {
            "scripted/test".to_string()
        }

        async fn complete(&self, request: MessagesRequest) -> Result<MessagesResponse> {
            self.requests.lock().unwrap().push(request);
            let text = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Model("no scripted reply left".to_string()))?;
            Ok(MessagesResponse {
                id: "msg".to_string(),
                content: vec![MessageContent::Text { text }],
                model: "test".to_string(),
                stop_reason: Some("end_turn".to_string()),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_act_performs_planned_steps() {
        let model = ScriptedModel::new(&[
            r#"{"steps": [{"action": "type", "id": 2, "text": "alice"}, {"action": "click", "id": 4}]}"#,
        ]);
        let interpreter = ModelInterpreter::new(model.clone(), None);
        let driver = FakeDriver::new(Platform::Chromium);

        let outcome = interpreter.act(&driver, "log in as alice", None).await.unwrap();
        assert_eq!(outcome.steps.len(), 2);
        assert!(!outcome.cached);
        assert_eq!(driver.performed(), outcome.steps);

        let prompt = model.last_request().messages[0].text_content();
        assert!(prompt.contains("Goal: log in as alice"));
        assert!(prompt.contains("button [id=4] \"Sign in\""));
    }

    #[tokio::test]
    async fn test_act_rejects_unknown_node() {
        let model = ScriptedModel::new(&[r#"{"steps": [{"action": "click", "id": 99}]}"#]);
        let interpreter = ModelInterpreter::new(model, None);
        let driver = FakeDriver::new(Platform::Chromium);

        let err = interpreter.act(&driver, "click the ghost", None).await.unwrap_err();
        assert_eq!(err.category(), "unresolved_action");
        assert!(driver.performed().is_empty());
    }

    #[tokio::test]
    async fn test_act_without_steps_is_unresolved() {
        let model = ScriptedModel::new(&[r#"{"steps": [], "explanation": "no such button"}"#]);
        let interpreter = ModelInterpreter::new(model, None);
        let driver = FakeDriver::new(Platform::Chromium);

        let err = interpreter.act(&driver, "click purple", None).await.unwrap_err();
        assert_eq!(err.category(), "unresolved_action");
        assert!(err.to_string().contains("no such button"));
    }

    #[tokio::test]
    async fn test_act_replays_from_cache() {
        let model = ScriptedModel::new(&[r#"{"steps": [{"action": "click", "id": 4}]}"#]);
        let interpreter = ModelInterpreter::new(model.clone(), Some(InstructionCache::in_memory()));
        let driver = FakeDriver::new(Platform::Chromium);

        interpreter.act(&driver, "click sign in", None).await.unwrap();
        let second = interpreter.act(&driver, "Click sign in", None).await.unwrap();

        assert!(second.cached);
        assert_eq!(model.request_count(), 1);
        assert_eq!(driver.performed().len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_act_only_sees_area() {
        let model = ScriptedModel::new(&[r#"{"steps": [{"action": "click", "id": 4}]}"#]);
        let interpreter = ModelInterpreter::new(model.clone(), None);
        let driver = FakeDriver::new(Platform::Chromium);
        let scope = AreaScope {
            root: 5,
            description: "main menu".to_string(),
        };

        // node 4 lives outside the navigation area
        let err = interpreter.act(&driver, "sign in", Some(&scope)).await.unwrap_err();
        assert_eq!(err.category(), "unresolved_action");

        let prompt = model.last_request().messages[0].text_content();
        assert!(prompt.contains("link [id=6] \"Home\""));
        assert!(!prompt.contains("Sign in"));
    }

    #[tokio::test]
    async fn test_check_returns_verdict() {
        let model = ScriptedModel::new(&[
            "```json\n{\"result\": false, \"explanation\": \"title is Login\"}\n```",
        ]);
        let interpreter = ModelInterpreter::new(model.clone(), None);
        let driver = FakeDriver::new(Platform::Chromium);

        let verdict = interpreter
            .check(&driver, "title is Dashboard", true, None)
            .await
            .unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.explanation, "title is Login");
        assert!(model.last_request().messages[0].has_images());
    }

    #[tokio::test]
    async fn test_get_returns_value() {
        let model = ScriptedModel::new(&[r#"Here you go: {"value": ["Home"]}"#]);
        let interpreter = ModelInterpreter::new(model.clone(), None);
        let driver = FakeDriver::new(Platform::Chromium);

        let value = interpreter.get(&driver, "menu items", false, None).await.unwrap();
        assert_eq!(value, serde_json::json!(["Home"]));
        assert!(!model.last_request().messages[0].has_images());
    }

    #[tokio::test]
    async fn test_locate_area() {
        let model = ScriptedModel::new(&[r#"{"id": 5}"#, r#"{"id": null, "explanation": "none"}"#]);
        let interpreter = ModelInterpreter::new(model, None);
        let driver = FakeDriver::new(Platform::Chromium);

        let scope = interpreter.locate_area(&driver, "navigation").await.unwrap();
        assert_eq!(scope.root, 5);

        let err = interpreter.locate_area(&driver, "footer").await.unwrap_err();
        assert_eq!(err.category(), "unresolved_action");
    }

    #[tokio::test]
    async fn test_garbage_reply_is_model_error() {
        let model = ScriptedModel::new(&["I cannot help with that"]);
        let interpreter = ModelInterpreter::new(model, None);
        let driver = FakeDriver::new(Platform::Chromium);

        let err = interpreter.check(&driver, "anything", false, None).await.unwrap_err();
        assert_eq!(err.category(), "model");
    }

    #[tokio::test]
    async fn test_save_cache_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let model = ScriptedModel::new(&[r#"{"steps": [{"action": "click", "id": 4}]}"#]);
        let interpreter = ModelInterpreter::new(model, Some(InstructionCache::load(&path)));
        let driver = FakeDriver::new(Platform::Chromium);

        interpreter.act(&driver, "sign in", None).await.unwrap();
        let saved = interpreter.save_cache().await.unwrap();
        assert_eq!(saved, Some(path.clone()));
        assert!(path.exists());

        let disabled = ModelInterpreter::new(ScriptedModel::new(&[]), None);
        assert_eq!(disabled.save_cache().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_flushes_unsaved_plans() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let model = ScriptedModel::new(&[r#"{"steps": [{"action": "click", "id": 4}]}"#]);
        let interpreter = ModelInterpreter::new(model, Some(InstructionCache::load(&path)));
        let driver = FakeDriver::new(Platform::Chromium);

        interpreter.close().await.unwrap();
        assert!(!path.exists());

        interpreter.act(&driver, "sign in", None).await.unwrap();
        interpreter.close().await.unwrap();
        assert_eq!(InstructionCache::load(&path).len(), 1);
    }

    #[tokio::test]
    async fn test_prompts_carry_page_title_and_url() {
        let model = ScriptedModel::new(&[r#"{"value": 2}"#]);
        let interpreter = ModelInterpreter::new(model.clone(), None);
        let cart = AccessibilityTree::from_nodes(vec![
            AxNode::new(1, "document", "Cart"),
            AxNode::new(2, "listitem", "Socks").with_parent(1),
            AxNode::new(3, "listitem", "Hat").with_parent(1),
        ])
        .unwrap();
        let driver = FakeDriver::new(Platform::Chromium).with_tree(cart);
        driver.navigate("https://shop.example/cart").await.unwrap();

        let value = interpreter.get(&driver, "item count", false, None).await.unwrap();
        assert_eq!(value, serde_json::json!(2));

        let prompt = model.last_request().messages[0].text_content();
        assert!(prompt.starts_with("Page: Cart (https://shop.example/cart)\n"));
        assert!(prompt.contains("listitem [id=3] \"Hat\""));
    }

    #[test]
    fn test_factory_requires_api_key() {
        let factory = ModelInterpreterFactory::new(&Config::default());
        let mut model = ModelSpec::default();
        model.api_key = None;

        let err = factory.create(&model).err().unwrap();
        assert_eq!(err.category(), "authentication");
    }

    #[test]
    fn test_cache_path_is_per_model() {
        let factory = ModelInterpreterFactory::new(&Config::default());
        let path = factory.cache_path(&ModelSpec::default());
        assert_eq!(
            path,
            PathBuf::from(".alumnium/cache/anthropic_claude-haiku-4-5-20251001.json")
        );
    }
}

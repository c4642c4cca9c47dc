//! Configuration management
//!
//! Configuration is resolved in the following order of precedence:
//! 1. Environment variables (`ALUMNIUM_*` and provider API keys)
//! 2. `alumnium-mcp.toml` (or a file passed with `--config`)
//! 3. Default values
//!
//! `${VAR_NAME}` references inside the configuration file are expanded from
//! the environment before parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Default configuration file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "alumnium-mcp.toml";

/// Model used when `ALUMNIUM_MODEL` is not set
pub const DEFAULT_MODEL: &str = "anthropic/claude-haiku-4-5-20251001";

/// Language model provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Google,
    DeepSeek,
    MistralAi,
    XAi,
    Ollama,
}

/// Wire format spoken by a provider endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI-compatible chat completions
    OpenAiCompatible,
}

impl Provider {
    /// Parse a provider from the prefix of `ALUMNIUM_MODEL`
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "google" | "gemini" => Ok(Self::Google),
            "deepseek" => Ok(Self::DeepSeek),
            "mistralai" | "mistral" => Ok(Self::MistralAi),
            "xai" | "grok" => Ok(Self::XAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::Config(format!("Unknown model provider: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::DeepSeek => "deepseek",
            Self::MistralAi => "mistralai",
            Self::XAi => "xai",
            Self::Ollama => "ollama",
        }
    }

    /// Model picked when only the provider is given
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-haiku-4-5-20251001",
            Self::OpenAi => "gpt-4o-mini",
            Self::Google => "gemini-2.0-flash",
            Self::DeepSeek => "deepseek-chat",
            Self::MistralAi => "mistral-medium-latest",
            Self::XAi => "grok-3-mini",
            Self::Ollama => "mistral-small3.1",
        }
    }

    /// Environment variable holding the API key, if the provider needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::MistralAi => Some("MISTRAL_API_KEY"),
            Self::XAi => Some("XAI_API_KEY"),
            Self::Ollama => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::MistralAi => "https://api.mistral.ai/v1",
            Self::XAi => "https://api.x.ai/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn wire_format(&self) -> WireFormat {
        match self {
            Self::Anthropic => WireFormat::Anthropic,
            _ => WireFormat::OpenAiCompatible,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language model selection (`provider/model-name`) plus credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: Provider,
    pub name: String,
    /// API key, resolved from the provider's environment variable
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Endpoint override
    pub base_url: Option<String>,
}

impl ModelSpec {
    /// Parse `provider/model-name`; a bare provider selects its default model
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Config("ALUMNIUM_MODEL is empty".to_string()));
        }

        let (provider, name) = match value.split_once('/') {
            Some((provider, name)) => {
                let provider = Provider::parse(provider)?;
                let name = if name.trim().is_empty() {
                    provider.default_model().to_string()
                } else {
                    name.trim().to_string()
                };
                (provider, name)
            }
            None => {
                let provider = Provider::parse(value)?;
                (provider, provider.default_model().to_string())
            }
        };

        Ok(Self {
            provider,
            name,
            api_key: None,
            base_url: None,
        })
    }

    /// `provider/model-name` identifier
    pub fn id(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }

    /// Endpoint to talk to, honouring the override
    pub fn endpoint(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Return the API key or an authentication error naming the missing variable
    pub fn require_api_key(&self) -> Result<Option<String>> {
        match self.provider.api_key_env() {
            None => Ok(self.api_key.clone()),
            Some(var) => match &self.api_key {
                Some(key) if !key.trim().is_empty() => Ok(Some(key.clone())),
                _ => Err(Error::Auth(format!(
                    "{} is not set for model {}",
                    var,
                    self.id()
                ))),
            },
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        // DEFAULT_MODEL is a valid literal
        Self::parse(DEFAULT_MODEL).unwrap_or(Self {
            provider: Provider::Anthropic,
            name: Provider::Anthropic.default_model().to_string(),
            api_key: None,
            base_url: None,
        })
    }
}

/// Local Chromium settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromiumConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Explicit browser binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    /// Window width in pixels
    pub width: u32,
    /// Window height in pixels
    pub height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout: u64,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            width: 1280,
            height: 900,
            navigation_timeout: 30,
        }
    }
}

/// Appium (iOS / XCUITest) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppiumConfig {
    pub server_url: String,
    pub device_name: String,
    pub platform_version: String,
    /// Seconds Appium waits for a new command before closing the session
    pub new_command_timeout: u64,
    /// Milliseconds allowed for WebDriverAgent to launch
    pub wda_launch_timeout_ms: u64,
}

impl Default for AppiumConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:4723".to_string(),
            device_name: "iPhone 16".to_string(),
            platform_version: "18.4".to_string(),
            new_command_timeout: 300,
            wda_launch_timeout_ms: 90_000,
        }
    }
}

/// Instruction cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".alumnium/cache"),
        }
    }
}

/// Main configuration for the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelSpec,
    pub chromium: ChromiumConfig,
    pub appium: AppiumConfig,
    pub cache: CacheConfig,
    /// Timeout for a single model request, in seconds
    pub request_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            chromium: ChromiumConfig::default(),
            appium: AppiumConfig::default(),
            cache: CacheConfig::default(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

impl Config {
    /// Expand `${VAR_NAME}` references; unknown variables expand to nothing
    fn expand_env_vars(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Some(env_value) = lookup(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content, &env_lookup)?;
        config.apply_overrides(&env_lookup)?;
        Ok(config)
    }

    /// Load configuration from the given file, the default file, or the environment only
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn from_toml_str(content: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = Self::expand_env_vars(content, lookup);
        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut config = Self::default();

        if let Some(model) = toml.model {
            if let Some(name) = model.name {
                config.model = ModelSpec::parse(&name)?;
            }
            config.model.api_key = model.api_key.filter(|k| !k.is_empty());
            config.model.base_url = model.base_url.filter(|u| !u.is_empty());
        }

        if let Some(chromium) = toml.chromium {
            let defaults = ChromiumConfig::default();
            config.chromium = ChromiumConfig {
                headless: chromium.headless.unwrap_or(defaults.headless),
                executable: chromium.executable.map(PathBuf::from),
                width: chromium.width.unwrap_or(defaults.width),
                height: chromium.height.unwrap_or(defaults.height),
                navigation_timeout: chromium
                    .navigation_timeout
                    .unwrap_or(defaults.navigation_timeout),
            };
        }

        if let Some(appium) = toml.appium {
            let defaults = AppiumConfig::default();
            config.appium = AppiumConfig {
                server_url: appium.server_url.unwrap_or(defaults.server_url),
                device_name: appium.device_name.unwrap_or(defaults.device_name),
                platform_version: appium
                    .platform_version
                    .unwrap_or(defaults.platform_version),
                new_command_timeout: appium
                    .new_command_timeout
                    .unwrap_or(defaults.new_command_timeout),
                wda_launch_timeout_ms: appium
                    .wda_launch_timeout_ms
                    .unwrap_or(defaults.wda_launch_timeout_ms),
            };
        }

        if let Some(cache) = toml.cache {
            let defaults = CacheConfig::default();
            config.cache = CacheConfig {
                enabled: cache.enabled.unwrap_or(defaults.enabled),
                dir: cache.dir.map(PathBuf::from).unwrap_or(defaults.dir),
            };
        }

        if let Some(timeout) = toml.request_timeout {
            config.request_timeout = timeout;
        }

        Ok(config)
    }

    /// Override values with environment variables (environment wins)
    fn apply_overrides(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("ALUMNIUM_MODEL") {
            let base_url = self.model.base_url.take();
            let api_key = self.model.api_key.take();
            let parsed = ModelSpec::parse(&model)?;
            // keys from the file only apply to the provider they were written for
            let same_provider = parsed.provider == self.model.provider;
            self.model = parsed;
            if same_provider {
                self.model.base_url = base_url;
                self.model.api_key = api_key;
            }
        }

        if let Some(var) = self.model.provider.api_key_env() {
            if let Some(key) = non_empty(var) {
                self.model.api_key = Some(key);
            }
        }

        if let Some(url) = non_empty("ALUMNIUM_MODEL_BASE_URL") {
            self.model.base_url = Some(url);
        }

        if let Some(headless) = non_empty("ALUMNIUM_CHROME_HEADLESS") {
            self.chromium.headless = parse_bool(&headless);
        }
        if let Some(path) = non_empty("ALUMNIUM_CHROME_PATH") {
            self.chromium.executable = Some(PathBuf::from(path));
        }

        if let Some(server) = non_empty("ALUMNIUM_APPIUM_SERVER") {
            self.appium.server_url = server;
        }
        if let Some(device) = non_empty("ALUMNIUM_IOS_DEVICE_NAME") {
            self.appium.device_name = device;
        }
        if let Some(version) = non_empty("ALUMNIUM_IOS_PLATFORM_VERSION") {
            self.appium.platform_version = version;
        }

        if let Some(dir) = non_empty("ALUMNIUM_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(enabled) = non_empty("ALUMNIUM_CACHE") {
            self.cache.enabled = parse_bool(&enabled);
        }

        if let Some(timeout) = non_empty("ALUMNIUM_REQUEST_TIMEOUT") {
            self.request_timeout = timeout.trim().parse().map_err(|_| {
                Error::Config(format!("ALUMNIUM_REQUEST_TIMEOUT is not a number: {}", timeout))
            })?;
        }

        Ok(())
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    model: Option<TomlModelConfig>,
    chromium: Option<TomlChromiumConfig>,
    appium: Option<TomlAppiumConfig>,
    cache: Option<TomlCacheConfig>,
    request_timeout: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlModelConfig {
    /// `provider/model-name`
    name: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlChromiumConfig {
    headless: Option<bool>,
    executable: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    navigation_timeout: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlAppiumConfig {
    server_url: Option<String>,
    device_name: Option<String>,
    platform_version: Option<String>,
    new_command_timeout: Option<u64>,
    wda_launch_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlCacheConfig {
    enabled: Option<bool>,
    dir: Option<String>,
}

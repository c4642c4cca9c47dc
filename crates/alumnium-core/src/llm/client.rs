//! LLM API HTTP Client
//!
//! Speaks the Anthropic Messages API and the OpenAI-compatible chat
//! completions API (OpenAI, Google, DeepSeek, Mistral, xAI, Ollama).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ModelSpec, WireFormat};
use crate::error::{Error, Result};

use super::types::*;
use super::LanguageModel;

/// HTTP client for the configured model provider
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    model: ModelSpec,
    base_url: String,
}

impl LlmClient {
    /// Create a client; fails with an authentication error when the key is missing
    pub fn new(model: &ModelSpec, timeout: Duration) -> Result<Self> {
        let api_key = model.require_api_key()?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            api_key,
            model: model.clone(),
            base_url: model.endpoint(),
        })
    }

    /// Send a message to the model API
    ///
    /// An empty `request.model` is filled with the configured model name.
    pub async fn messages(&self, mut request: MessagesRequest) -> Result<MessagesResponse> {
        if request.model.is_empty() {
            request.model = self.model.name.clone();
        }
        match self.model.provider.wire_format() {
            WireFormat::Anthropic => self.send_anthropic_request(request).await,
            WireFormat::OpenAiCompatible => self.send_openai_request(request).await,
        }
    }

    async fn send_anthropic_request(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(url = %url, model = %request.model, "Sending request to Anthropic API");

        let mut builder = self
            .client
            .post(&url)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder.json(&request).send().await.map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;
        check_status(status, &body)?;

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Model(format!("Failed to parse response: {} - {}", e, body))
        })?;

        info!(
            stop_reason = ?parsed.stop_reason,
            output_tokens = parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0),
            "Anthropic API response"
        );

        Ok(parsed)
    }

    async fn send_openai_request(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(url = %url, model = %request.model, "Sending request to OpenAI-compatible API");

        let openai_request = ChatCompletionRequest::from_messages_request(&request);

        let mut builder = self
            .client
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .json(&openai_request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;
        check_status(status, &body)?;

        let openai_response: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Model(format!("Failed to parse response: {} - {}", e, body))
        })?;

        let parsed = openai_response.to_messages_response();

        info!(
            stop_reason = ?parsed.stop_reason,
            output_tokens = parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0),
            "OpenAI-compatible API response"
        );

        Ok(parsed)
    }
}

fn check_status(status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    warn!(status = %status, body = %body, "Model API error");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(Error::Auth(format!("{}: {}", status, body)))
    } else {
        Err(Error::Model(format!("{}: {}", status, body)))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    fn model_id(&self) -> String {
        self.model.id()
    }

    async fn complete(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        self.messages(request).await
    }
}

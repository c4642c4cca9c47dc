//! LLM API client and types
//!
//! Supports the Anthropic Messages API and OpenAI-compatible APIs.

mod client;
mod types;

use async_trait::async_trait;

use crate::Result;

pub use client::LlmClient;
pub use types::*;

/// Anything that can answer a [`MessagesRequest`]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// `provider/model-name`
    fn model_id(&self) -> String;

    async fn complete(&self, request: MessagesRequest) -> Result<MessagesResponse>;
}

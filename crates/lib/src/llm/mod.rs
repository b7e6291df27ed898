//! LLM abstraction and chat clients.
//!
//! Two backends: a local Ollama instance and any OpenAI-compatible
//! endpoint (api.openai.com, LM Studio, vLLM). Both implement
//! [`LlmBackend`], so dispatch code is written once against the trait.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One chat message. Role is "system", "user", or "assistant".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("model api error: {0}")]
    Api(String),
}

impl From<LlmError> for crate::error::Error {
    fn from(e: LlmError) -> Self {
        crate::error::Error::Upstream(e.to_string())
    }
}

/// A chat-capable model provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run one non-streaming chat completion and return the assistant text.
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError>;
}

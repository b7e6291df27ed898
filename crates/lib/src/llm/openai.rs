//! OpenAI-compatible chat client (api.openai.com, LM Studio, vLLM).
//!
//! Talks to {base}/chat/completions; the base URL must include the
//! version segment (e.g. https://api.openai.com/v1).

use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::{ChatMessage, LlmBackend, LlmError};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:1234/v1";

/// Client for an OpenAI-compatible chat API.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// POST /chat/completions — non-streaming chat completion.
    pub async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("openai: {} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await?;
        Ok(data
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmBackend for OpenAiClient {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        OpenAiClient::chat(self, model, messages).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

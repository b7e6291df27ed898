//! Ollama API client (http://127.0.0.1:11434 by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, LlmBackend, LlmError};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Client for the Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// POST /api/chat — non-streaming chat completion.
    pub async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("ollama: {} {}", status, body)));
        }
        let data: ChatResponse = res.json().await?;
        Ok(data.message.map(|m| m.content).unwrap_or_default())
    }
}

#[async_trait]
impl LlmBackend for OllamaClient {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        OllamaClient::chat(self, model, messages).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

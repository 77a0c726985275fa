//! Text generation gateway for the Ollama HTTP API.
//!
//! Everything that talks to the generation backend goes through the
//! [`TextGenerator`] trait so filter, synthesis and explanation strategies
//! stay replaceable and testable without a live backend.

use crate::error::{NlqError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const NO_RESPONSE_FALLBACK: &str = "No response generated";

/// One turn of a conversational exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Capability boundary for the text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single-shot completion of a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Conversational completion with prior turns as context.
    async fn generate_with_history(&self, prompt: &str, history: &[ChatTurn]) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.7,
            num_predict: 500,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_num_predict(mut self, num_predict: u32) -> Self {
        self.num_predict = num_predict;
        self
    }

    fn options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Ollama generate, prompt is {} chars", prompt.len());

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options(),
        };

        let response = self
            .client
            .post(&format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::Gateway(format!("Ollama API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NlqError::Gateway(format!(
                "Ollama API error ({}): {}",
                status, text
            )));
        }

        let data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| NlqError::Gateway(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(data
            .response
            .unwrap_or_else(|| NO_RESPONSE_FALLBACK.to_string()))
    }

    async fn generate_with_history(&self, prompt: &str, history: &[ChatTurn]) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatTurn::new(
            "system",
            "You are a helpful assistant that keeps conversations natural.",
        ));
        messages.extend_from_slice(history);
        messages.push(ChatTurn::new("user", prompt));

        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: self.options(),
        };

        let response = self
            .client
            .post(&format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::Gateway(format!("Ollama API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(NlqError::Gateway(format!(
                "Ollama API error ({}): {}",
                status, text
            )));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| NlqError::Gateway(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(data
            .message
            .and_then(|m| m.content)
            .unwrap_or_else(|| NO_RESPONSE_FALLBACK.to_string()))
    }
}

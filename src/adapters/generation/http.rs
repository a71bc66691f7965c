//! Chat-completion text generator.
//!
//! Calls an OpenAI-compatible `/chat/completions` endpoint with a system and
//! a user message and returns the first choice.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::GenerationConfig;
use crate::domain::ports::TextGenerator;

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "DOCBOT_GENERATION_API_KEY";

#[derive(Debug, Clone)]
pub struct HttpGenerationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl From<&GenerationConfig> for HttpGenerationConfig {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

pub struct HttpTextGenerator {
    config: HttpGenerationConfig,
    client: reqwest::Client,
}

impl HttpTextGenerator {
    pub fn new(config: HttpGenerationConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::GenerationFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_key(&self) -> Option<String> {
        self.config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn generate(&self, system: &str, prompt: &str) -> DomainResult<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = self.api_key() {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::GenerationFailed(format!("completion request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(DomainError::GenerationFailed(format!(
                "completion API returned {status}: {text}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            DomainError::GenerationFailed(format!("failed to parse completion response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| DomainError::GenerationFailed("completion had no choices".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::generate::Generator;
use crate::{Error, Result};

/// Settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// Server root, `/v1` root, or the full completions URL
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Per-request timeout enforced by the HTTP client
    pub timeout: Duration,
}

impl Default for ChatCompletionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Generator backed by `/v1/chat/completions`.
///
/// Sends the prompt as a single user message and returns the first choice.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    config: ChatCompletionsConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatCompletionsGenerator {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::GenerationUnavailable(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint(&config.base_url),
            config,
        })
    }

    /// Resolved completions URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::GenerationTimeout(self.config.timeout)
        } else {
            Error::GenerationUnavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(Error::GenerationUnavailable(format!("{status}: {text}")));
        }

        debug!(model = %self.config.model, bytes = text.len(), "generation finished");
        parse_content(&text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Resolve the chat completions endpoint from a base URL.
fn endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

fn parse_content(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::GenerationUnavailable(format!("unreadable response: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| Error::GenerationUnavailable("response has no content".to_string()))
}

//! OpenAI-compatible chat-completions backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clients::traits::{GenerationError, GenerationRequest, TextGenerator, backoff_delay_ms};
use crate::config::LlmConfig;

#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    retry_delay_ms: u64,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig, api_key: Option<&str>) -> Result<Self, GenerationError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(GenerationError::MissingApiKey)?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let base = config.base_url.trim_end_matches('/');
        let endpoint = if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        };

        Ok(Self {
            client,
            endpoint,
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    GenerationError::from(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: truncate_snippet(&body, 500),
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            model = %self.model,
            chars = request.prompt.len(),
            temperature = request.temperature,
            "Sending chat completion"
        );

        // Retry transient failures with simple exponential backoff
        let mut attempt = 0u32;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay_ms = backoff_delay_ms(self.retry_delay_ms, attempt);
                    warn!(
                        model = %self.model,
                        attempt = attempt + 1,
                        delay_ms,
                        error = %e,
                        "Chat completion failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_rejected_up_front() {
        let cfg = LlmConfig::default();
        assert!(matches!(
            OpenAiChatClient::new(&cfg, None),
            Err(GenerationError::MissingApiKey)
        ));
        assert!(matches!(
            OpenAiChatClient::new(&cfg, Some("   ")),
            Err(GenerationError::MissingApiKey)
        ));
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let mut cfg = LlmConfig::default();
        cfg.base_url = "http://127.0.0.1:8111/v1/".to_string();
        let client = OpenAiChatClient::new(&cfg, Some("sk-test")).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:8111/v1/chat/completions");

        cfg.base_url = "http://localhost/v1/chat/completions".to_string();
        let client = OpenAiChatClient::new(&cfg, Some("sk-test")).unwrap();
        assert_eq!(client.endpoint, "http://localhost/v1/chat/completions");
    }

    #[test]
    fn transient_classification() {
        assert!(GenerationError::Status { status: 429, body: String::new() }.is_transient());
        assert!(GenerationError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!GenerationError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!GenerationError::MissingApiKey.is_transient());
    }

    #[test]
    fn snippets_are_truncated() {
        assert_eq!(truncate_snippet("  short ", 10), "short");
        assert_eq!(truncate_snippet("abcdef", 3), "abc…");
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One prompt for the text-generation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("no API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,
}

impl GenerationError {
    /// Whether the same request may succeed if sent again
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Timeout { .. } | GenerationError::Transport(_) => true,
            GenerationError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerationError::EmptyResponse => true,
            GenerationError::Parse(_) | GenerationError::MissingApiKey => false,
        }
    }
}

/// Exponential backoff: `base_ms * 2^exponent`, exponent capped at 6, saturating
pub fn backoff_delay_ms(base_ms: u64, exponent: u32) -> u64 {
    base_ms.saturating_mul(1u64 << exponent.min(6))
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GenerationError::Parse(err.to_string())
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Opaque text-generation capability: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

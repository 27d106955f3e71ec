use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoachError, Result};

/// Main configuration structure loaded from regulation_coach.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub llm: LlmConfig,
    pub matching: MatchingConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Where the codebook, case library and templates live
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    pub codebook_path: PathBuf,
    pub cases_path: PathBuf,
    pub templates_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            codebook_path: PathBuf::from("data/codebook.txt"),
            cases_path: PathBuf::from("data/tiered_weighted_cases.json"),
            templates_dir: PathBuf::from("templates"),
        }
    }
}

/// Language model backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Low temperature keeps classification stable across runs
    pub classify_temperature: f32,
    pub render_temperature: f32,
    pub timeout_ms: u64,
    /// Categorizer attempts, each one a fresh prompt or a corrective re-prompt
    pub max_attempts: u32,
    /// Transport retries inside a single attempt
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            classify_temperature: 0.2,
            render_temperature: 0.7,
            timeout_ms: 60_000,
            max_attempts: 3,
            max_retries: 2,
            retry_delay_ms: 500,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Number of similar cases to surface, 0 for all
    pub top_k: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub openai_api_key: Option<String>,
}

impl RuntimeConfig {
    pub fn load_from(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses REGULATION_COACH_CONFIG environment variable or defaults to "regulation_coach.toml"
    pub fn load() -> Result<Self> {
        // Load environment variables with fallbacks:
        // 1) COACH_ENV_FILE if set
        // 2) ./.env
        // 3) ../.env (repo root when running from a subdirectory)
        if let Ok(env_path) = std::env::var("COACH_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
            if std::env::var("OPENAI_API_KEY").is_err() {
                let _ = dotenvy::from_path("../.env");
            }
        }

        let config_path = std::env::var("REGULATION_COACH_CONFIG")
            .unwrap_or_else(|_| "regulation_coach.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        let lookup = |key: &str| std::env::var(key).ok();
        config.apply_env_overrides(&lookup);
        config.runtime = RuntimeConfig::load_from(&lookup);
        config.validate();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Env-first overrides for paths and the model backend
    pub fn apply_env_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("COACH_CODEBOOK_PATH") {
            self.data.codebook_path = PathBuf::from(path);
            tracing::debug!("COACH_CODEBOOK_PATH env override applied");
        }
        if let Some(path) = lookup("COACH_CASES_PATH") {
            self.data.cases_path = PathBuf::from(path);
            tracing::debug!("COACH_CASES_PATH env override applied");
        }
        if let Some(dir) = lookup("COACH_TEMPLATES_DIR") {
            self.data.templates_dir = PathBuf::from(dir);
            tracing::debug!("COACH_TEMPLATES_DIR env override applied");
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("COACH_MODEL") {
            self.llm.model = model;
        }
        if let Some(timeout) = lookup("COACH_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.llm.timeout_ms = timeout;
        }
        if let Some(attempts) = lookup("COACH_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.llm.max_attempts = attempts;
        }
        if let Some(retries) = lookup("COACH_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.llm.max_retries = retries;
        }
        if let Some(top_k) = lookup("COACH_TOP_K").and_then(|v| v.parse().ok()) {
            self.matching.top_k = top_k;
        }
    }

    /// Clamp out-of-range values, warning about each one
    pub fn validate(&mut self) {
        if self.llm.max_attempts == 0 {
            self.llm.max_attempts = 1;
        } else if self.llm.max_attempts > 10 {
            tracing::warn!(
                "max_attempts {} exceeds max 10, clamping to 10",
                self.llm.max_attempts
            );
            self.llm.max_attempts = 10;
        }
        if self.llm.max_retries > 5 {
            tracing::warn!(
                "max_retries {} exceeds max 5, clamping to 5",
                self.llm.max_retries
            );
            self.llm.max_retries = 5;
        }
        for (name, temp) in [
            ("classify_temperature", &mut self.llm.classify_temperature),
            ("render_temperature", &mut self.llm.render_temperature),
        ] {
            if !(0.0..=2.0).contains(&*temp) {
                tracing::warn!("{} {} outside 0.0..=2.0, clamping", name, temp);
                *temp = temp.clamp(0.0, 2.0);
            }
        }
        if self.llm.timeout_ms < 1_000 {
            tracing::warn!(
                "timeout_ms {} is too small, raising to 1000",
                self.llm.timeout_ms
            );
            self.llm.timeout_ms = 1_000;
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://")
        {
            tracing::warn!(
                "LLM base URL '{}' doesn't start with http:// or https://",
                self.llm.base_url
            );
        }
    }

    /// Fail early when the model backend cannot be reached without an API key
    pub fn require_api_key(&self) -> Result<&str> {
        self.runtime
            .openai_api_key
            .as_deref()
            .ok_or_else(|| CoachError::Config {
                message: "OPENAI_API_KEY is not set".to_string(),
            })
    }
}

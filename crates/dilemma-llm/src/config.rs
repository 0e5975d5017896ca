//! OpenRouter client configuration

use std::time::Duration;

use crate::error::CompletionError;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REFERER: &str = "http://localhost:3000";
pub const DEFAULT_TITLE: &str = "AI Prisoner's Dilemma Tournament";

/// Configuration for [`crate::OpenRouterBackend`]
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    /// Bearer token sent on every request
    pub api_key: String,
    /// API root, without trailing slash
    pub base_url: String,
    /// `HTTP-Referer` header value
    pub referer: String,
    /// `X-Title` header value
    pub title: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout
    pub timeout: Duration,
    /// How long cached key info stays fresh
    pub key_info_ttl: Duration,
}

impl OpenRouterConfig {
    /// Create a config with defaults for everything but the key
    pub fn new(api_key: impl Into<String>) -> Self {
        OpenRouterConfig {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout: Duration::from_secs(30),
            key_info_ttl: Duration::from_secs(60),
        }
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - OPENROUTER_API_KEY (required)
    /// - OPENROUTER_BASE_URL (optional, default: "https://openrouter.ai/api/v1")
    /// - NEXTAUTH_URL (optional, used as HTTP-Referer)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CompletionError::Configuration("OPENROUTER_API_KEY is not configured".to_string())
            })?;

        let mut config = Self::new(api_key);
        if let Ok(base) = std::env::var("OPENROUTER_BASE_URL") {
            config = config.with_base_url(&base);
        }
        if let Ok(referer) = std::env::var("NEXTAUTH_URL") {
            config.referer = referer;
        }
        Ok(config)
    }

    /// Point the client at another OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_key_info_ttl(mut self, ttl: Duration) -> Self {
        self.key_info_ttl = ttl;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) fn key_url(&self) -> String {
        format!("{}/auth/key", self.base_url)
    }
}

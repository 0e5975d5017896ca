//! Completion backend port

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OpenRouterConfig;
use crate::Result;

/// Sampling and timeout settings stamped onto every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RequestDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        RequestDefaults {
            temperature: 0.7,
            max_tokens: 1500,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&OpenRouterConfig> for RequestDefaults {
    fn from(config: &OpenRouterConfig) -> Self {
        RequestDefaults {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        }
    }
}

/// One text-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Backend model identifier, e.g. `openai/gpt-5`
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, defaults: RequestDefaults) -> Self {
        CompletionRequest {
            model: model.into(),
            prompt: prompt.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            timeout: defaults.timeout,
        }
    }
}

/// A remote text-completion API.
///
/// Returns the generated text (possibly empty) or a classified
/// [`crate::CompletionError`]. Implementations do not retry.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

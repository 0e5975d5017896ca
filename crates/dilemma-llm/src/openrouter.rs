//! OpenRouter HTTP backend
//!
//! Speaks the OpenAI-compatible chat completion API and reads key/limit
//! information from `GET /auth/key`, cached behind an explicit TTL.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::{CompletionBackend, CompletionRequest};
use crate::config::OpenRouterConfig;
use crate::error::CompletionError;
use crate::Result;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a chat completion body.
///
/// Missing or null content is an empty completion, not an error.
pub fn extract_completion(model: &str, body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    let first = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::EmptyChoices {
            model: model.to_string(),
        })?;
    Ok(first
        .message
        .content
        .map(|c| c.trim().to_string())
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Key info
// ---------------------------------------------------------------------------

/// Request budget reported for a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    /// e.g. "10s", "1m"
    pub interval: String,
}

impl RateLimit {
    /// Parse `interval` ("500ms", "10s", "1m", "1h"; bare numbers are seconds).
    pub fn interval_duration(&self) -> Option<Duration> {
        let raw = self.interval.trim();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, unit) = raw.split_at(split);
        let value: u64 = digits.parse().ok()?;
        match unit {
            "ms" => Some(Duration::from_millis(value)),
            "" | "s" => Some(Duration::from_secs(value)),
            "m" => Some(Duration::from_secs(value * 60)),
            "h" => Some(Duration::from_secs(value * 3600)),
            _ => None,
        }
    }

    /// Minimum spacing between calls that stays inside the budget.
    pub fn min_spacing(&self) -> Option<Duration> {
        if self.requests == 0 {
            return None;
        }
        self.interval_duration().map(|d| d / self.requests)
    }
}

/// What OpenRouter reports about the configured key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub usage: f64,
    /// `None` means unlimited credit
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub is_free_tier: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

impl KeyInfo {
    /// Credit left, if the key has a limit
    pub fn remaining(&self) -> Option<f64> {
        self.limit.map(|limit| (limit - self.usage).max(0.0))
    }
}

#[derive(Debug, Deserialize)]
struct KeyInfoEnvelope {
    data: KeyInfo,
}

/// Parse a `GET /auth/key` body.
pub fn parse_key_info(body: &str) -> Result<KeyInfo> {
    let envelope: KeyInfoEnvelope = serde_json::from_str(body)?;
    Ok(envelope.data)
}

/// Single-entry cache for [`KeyInfo`] with an explicit time-to-live.
#[derive(Debug, Clone)]
pub struct KeyInfoCache {
    ttl: Duration,
    entry: Option<(KeyInfo, Instant)>,
}

impl KeyInfoCache {
    pub fn new(ttl: Duration) -> Self {
        KeyInfoCache { ttl, entry: None }
    }

    /// True when empty or when the entry is at least `ttl` old at `now`.
    pub fn is_stale(&self, now: Instant) -> bool {
        match &self.entry {
            Some((_, fetched_at)) => now.saturating_duration_since(*fetched_at) >= self.ttl,
            None => true,
        }
    }

    /// The cached value if still fresh at `now`.
    pub fn get(&self, now: Instant) -> Option<&KeyInfo> {
        if self.is_stale(now) {
            return None;
        }
        self.entry.as_ref().map(|(info, _)| info)
    }

    pub fn store(&mut self, info: KeyInfo, now: Instant) {
        self.entry = Some((info, now));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`CompletionBackend`] over the OpenRouter HTTP API
pub struct OpenRouterBackend {
    config: OpenRouterConfig,
    http_client: reqwest::Client,
    key_cache: Mutex<KeyInfoCache>,
}

impl OpenRouterBackend {
    /// Create a new backend
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(CompletionError::Configuration(
                "OPENROUTER_API_KEY is not configured".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("dilemma-llm/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Configuration(e.to_string()))?;

        let key_cache = Mutex::new(KeyInfoCache::new(config.key_info_ttl));
        Ok(OpenRouterBackend {
            config,
            http_client,
            key_cache,
        })
    }

    /// Create backend from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenRouterConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    fn cached_key_info(&self, now: Instant) -> Option<KeyInfo> {
        self.key_cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(now).cloned())
    }

    fn invalidate_key_info(&self) {
        if let Ok(mut cache) = self.key_cache.lock() {
            cache.invalidate();
        }
    }

    /// Key label, credit and rate limit, served from cache while fresh.
    #[instrument(skip(self))]
    pub async fn key_info(&self) -> Result<KeyInfo> {
        if let Some(info) = self.cached_key_info(Instant::now()) {
            debug!("key info served from cache");
            return Ok(info);
        }

        let response = self
            .http_client
            .get(self.config.key_url())
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CompletionError::from_status("auth/key", status.as_u16(), body));
        }

        let info = parse_key_info(&body)?;
        if let Ok(mut cache) = self.key_cache.lock() {
            cache.store(info.clone(), Instant::now());
        }
        info!(label = %info.label, free_tier = info.is_free_tier, "fetched key info");
        Ok(info)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http_client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "completion API error");
            let err = CompletionError::from_status(&request.model, status.as_u16(), text);
            if matches!(err, CompletionError::Unauthorized(_)) {
                self.invalidate_key_info();
            }
            return Err(err);
        }

        let completion = extract_completion(&request.model, &text)?;
        debug!(chars = completion.len(), "completion received");
        Ok(completion)
    }
}

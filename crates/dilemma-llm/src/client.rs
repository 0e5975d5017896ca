//! Retrying completion client
//!
//! Wraps a [`CompletionBackend`] with the bounded retry loop described by a
//! [`BackoffPolicy`]. All waiting goes through the injected [`Sleeper`].

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backend::{CompletionBackend, CompletionRequest, RequestDefaults};
use crate::backoff::{BackoffPolicy, TextVerdict};
use crate::error::CompletionError;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::Result;

/// Completion client with retry, cooldown and soft-failure handling
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    policy: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
    defaults: RequestDefaults,
}

impl CompletionClient {
    /// Create a client with the default policy and real sleeps
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        CompletionClient {
            backend,
            policy: BackoffPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            defaults: RequestDefaults::default(),
        }
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Ask `model` to complete `prompt`.
    ///
    /// Returns trimmed text, which may be empty or short when the final
    /// attempt produced nothing better. Fatal errors return immediately;
    /// other errors are retried while attempts remain, then propagated.
    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let request = CompletionRequest::new(model, prompt, self.defaults);
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            debug!(model, attempt = attempt + 1, attempts, "calling completion backend");

            match self.backend.complete(&request).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    match self.policy.judge_text(&text, attempt) {
                        TextVerdict::Accept => {
                            if text.is_empty() {
                                warn!(model, "final attempt returned empty text; leaving it to the parser");
                            } else {
                                info!(model, chars = text.len(), "completion received");
                            }
                            return Ok(text);
                        }
                        TextVerdict::RetryEmpty => {
                            warn!(model, attempt = attempt + 1, "empty completion, backend may be overloaded");
                            self.sleeper
                                .sleep(self.policy.empty_response_cooldown)
                                .await;
                        }
                        TextVerdict::RetryShort => {
                            warn!(model, attempt = attempt + 1, text = %text, "completion too short, retrying");
                        }
                    }
                }
                Err(err) if err.is_fatal() => {
                    error!(model, error = %err, "fatal completion error");
                    return Err(err);
                }
                Err(err) => {
                    warn!(model, attempt = attempt + 1, error = %err, "completion attempt failed");
                    if matches!(err, CompletionError::RateLimited { .. }) {
                        if let Some(cooldown) = self.policy.rate_limit_delay(attempt) {
                            info!(model, cooldown_secs = cooldown.as_secs(), "rate limited, cooling down");
                            self.sleeper.sleep(cooldown).await;
                        }
                    }
                    if self.policy.is_final(attempt) || !err.is_retryable() {
                        return Err(err);
                    }
                }
            }

            let delay = self.policy.retry_delay(&mut rand::thread_rng());
            info!(model, delay_ms = delay.as_millis() as u64, "retrying completion");
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedBackend;
    use crate::sleeper::RecordingSleeper;
    use std::time::Duration;

    fn client(backend: Arc<ScriptedBackend>, policy: BackoffPolicy) -> (CompletionClient, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = CompletionClient::new(backend)
            .with_policy(policy)
            .with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    #[tokio::test]
    async fn returns_trimmed_text_on_success() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text("m", "  Reasoning.\nMOVE: COOPERATE  ");
        let (client, sleeper) = client(backend.clone(), BackoffPolicy::default());

        let text = client.complete("m", "prompt").await.unwrap();
        assert_eq!(text, "Reasoning.\nMOVE: COOPERATE");
        assert!(sleeper.calls().is_empty());
        assert_eq!(backend.calls_for("m"), 1);
    }

    #[tokio::test]
    async fn fatal_error_is_never_retried() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error("m", CompletionError::Unauthorized("401".into()));
        backend.push_text("m", "never reached, long enough");
        let (client, sleeper) = client(backend.clone(), BackoffPolicy::default().with_max_attempts(3));

        let err = client.complete("m", "prompt").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(backend.calls_for("m"), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_on_single_attempt_cools_down_then_fails() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error("m", CompletionError::RateLimited { model: "m".into() });
        let (client, sleeper) = client(backend, BackoffPolicy::default());

        let err = client.complete("m", "prompt").await.unwrap_err();
        assert!(matches!(err, CompletionError::RateLimited { .. }));
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(15)]);
    }

    #[tokio::test]
    async fn transient_error_retries_with_jittered_delay() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(
            "m",
            CompletionError::Unavailable {
                model: "m".into(),
                status: 503,
            },
        );
        backend.push_text("m", "Fine now. MOVE: DEFECT");
        let (client, sleeper) = client(backend.clone(), BackoffPolicy::default().with_max_attempts(2));

        let text = client.complete("m", "prompt").await.unwrap();
        assert!(text.ends_with("MOVE: DEFECT"));
        assert_eq!(backend.calls_for("m"), 2);

        let calls = sleeper.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0] >= Duration::from_secs(10) && calls[0] <= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn empty_text_waits_longer_before_retry() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text("m", "");
        backend.push_text("m", "Second try worked. MOVE: COOPERATE");
        let (client, sleeper) = client(backend.clone(), BackoffPolicy::default().with_max_attempts(2));

        let text = client.complete("m", "prompt").await.unwrap();
        assert!(text.ends_with("MOVE: COOPERATE"));

        let calls = sleeper.calls();
        assert_eq!(calls[0], Duration::from_secs(20));
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn final_empty_or_short_text_is_returned_as_soft_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text("m", "ok");
        backend.push_text("m", "");
        let (client, _sleeper) = client(backend.clone(), BackoffPolicy::immediate(2));

        let text = client.complete("m", "prompt").await.unwrap();
        assert_eq!(text, "");
        assert_eq!(backend.calls_for("m"), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_early() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(
            "m",
            CompletionError::Http {
                status: 400,
                body: "bad request".into(),
            },
        );
        let (client, sleeper) = client(backend.clone(), BackoffPolicy::immediate(3));

        let err = client.complete("m", "prompt").await.unwrap_err();
        assert!(matches!(err, CompletionError::Http { status: 400, .. }));
        assert_eq!(backend.calls_for("m"), 1);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn request_carries_defaults() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text("m", "MOVE: COOPERATE please");
        let (client, _) = client(backend.clone(), BackoffPolicy::default());
        client.complete("m", "the prompt").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "the prompt");
        assert_eq!(requests[0].max_tokens, 1500);
        assert_eq!(requests[0].timeout, Duration::from_secs(30));
    }
}

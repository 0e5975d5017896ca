//! Retry and cooldown policy for completion calls
//!
//! Every timing constant of the retry loop lives here so it can be tuned in
//! one place and exercised without real sleeps.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded-attempt retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Total attempts per call, including the first (at least 1)
    pub max_attempts: u32,
    /// Fixed part of the delay between attempts
    pub retry_base: Duration,
    /// Upper bound of the uniform jitter added to `retry_base`
    pub retry_jitter: Duration,
    /// Mandatory wait after a rate-limit signal on the first attempt
    pub rate_limit_cooldown: Duration,
    /// Wait after an empty completion before retrying
    pub empty_response_cooldown: Duration,
    /// Completions shorter than this are retried when attempts remain
    pub min_response_len: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            max_attempts: 1,
            retry_base: Duration::from_secs(10),
            retry_jitter: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(15),
            empty_response_cooldown: Duration::from_secs(20),
            min_response_len: 10,
        }
    }
}

/// What the retry loop should do with a completion's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextVerdict {
    /// Hand the text to the caller
    Accept,
    /// Empty on a non-final attempt: cool down, then retry
    RetryEmpty,
    /// Suspiciously short on a non-final attempt: retry
    RetryShort,
}

impl BackoffPolicy {
    /// A policy with `max_attempts` attempts and no waiting at all.
    pub fn immediate(max_attempts: u32) -> Self {
        BackoffPolicy {
            max_attempts: max_attempts.max(1),
            retry_base: Duration::ZERO,
            retry_jitter: Duration::ZERO,
            rate_limit_cooldown: Duration::ZERO,
            empty_response_cooldown: Duration::ZERO,
            min_response_len: 10,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// `attempt` is zero-based.
    pub fn is_final(&self, attempt: u32) -> bool {
        attempt + 1 >= self.attempts()
    }

    /// Delay before the next attempt: `retry_base + U[0, retry_jitter]`.
    pub fn retry_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=jitter_ms)
        };
        self.retry_base + Duration::from_millis(extra)
    }

    /// Cooldown owed after a rate-limit signal, if any.
    pub fn rate_limit_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt == 0 && !self.rate_limit_cooldown.is_zero()).then_some(self.rate_limit_cooldown)
    }

    /// Classify a successful completion's text.
    pub fn judge_text(&self, text: &str, attempt: u32) -> TextVerdict {
        if self.is_final(attempt) {
            return TextVerdict::Accept;
        }
        let len = text.trim().chars().count();
        if len == 0 {
            TextVerdict::RetryEmpty
        } else if len < self.min_response_len {
            TextVerdict::RetryShort
        } else {
            TextVerdict::Accept
        }
    }
}

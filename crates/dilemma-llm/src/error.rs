//! Error types for dilemma-llm

use thiserror::Error;

/// Classified failures of a completion call.
///
/// The retry loop only looks at [`CompletionError::is_fatal`] and
/// [`CompletionError::is_retryable`]; everything else is surfaced as-is.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Bad or missing credentials (HTTP 401)
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// Backend asked us to slow down (HTTP 429)
    #[error("{model} rate limit exceeded")]
    RateLimited { model: String },

    /// Provider temporarily unavailable (HTTP 502/503)
    #[error("{model} provider temporarily unavailable ({status})")]
    Unavailable { model: String, status: u16 },

    /// The per-call timeout elapsed
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Body could not be decoded as a chat completion
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Well-formed response without any choices
    #[error("no choices returned by {model}")]
    EmptyChoices { model: String },

    /// Any other non-success status
    #[error("completion API error: {status} - {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Client misconfiguration (missing API key, bad base URL)
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CompletionError {
    /// Errors that must abort the whole match, never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CompletionError::Unauthorized(_) | CompletionError::Configuration(_)
        )
    }

    /// Errors worth another attempt if the retry budget allows.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::RateLimited { .. }
            | CompletionError::Unavailable { .. }
            | CompletionError::Timeout(_)
            | CompletionError::Transport(_)
            | CompletionError::EmptyChoices { .. } => true,
            CompletionError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to its classified error.
    pub fn from_status(model: &str, status: u16, body: String) -> Self {
        match status {
            401 => CompletionError::Unauthorized(format!(
                "backend returned {status}; check OPENROUTER_API_KEY"
            )),
            429 => CompletionError::RateLimited {
                model: model.to_string(),
            },
            502 | 503 => CompletionError::Unavailable {
                model: model.to_string(),
                status,
            },
            _ => CompletionError::Http { status, body },
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout(err.to_string())
        } else if err.is_decode() {
            CompletionError::Malformed(err.to_string())
        } else if err.is_builder() {
            CompletionError::Configuration(err.to_string())
        } else {
            CompletionError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CompletionError {
    fn from(err: serde_json::Error) -> Self {
        CompletionError::Malformed(err.to_string())
    }
}

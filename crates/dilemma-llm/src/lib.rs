//! Dilemma-LLM: Completion Client for Dilemma Arena
//!
//! This crate turns one agent's view of a match into a move decision:
//! it builds the round prompt, calls a remote completion backend with a
//! bounded retry policy, and parses free-form text into COOPERATE/DEFECT.
//!
//! ## Layer 1 - Completion
//!
//! Focus: Never let a noisy backend stall a match. Empty or garbled output
//! becomes data for the parser; only fatal errors escape unabsorbed.
//!
//! ## Key Components
//!
//! - `CompletionClient`: retry/cooldown loop over a `CompletionBackend`
//! - `OpenRouterBackend`: HTTP backend with a TTL-cached key-info lookup
//! - `parse_response`: total text → move cascade
//! - `ScriptedBackend`: queued fake responses for tests

pub mod backend;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod fakes;
pub mod openrouter;
pub mod parser;
pub mod prompt;
pub mod sleeper;

pub use backend::{CompletionBackend, CompletionRequest, RequestDefaults};
pub use backoff::{BackoffPolicy, TextVerdict};
pub use client::CompletionClient;
pub use config::OpenRouterConfig;
pub use error::CompletionError;
pub use fakes::ScriptedBackend;
pub use openrouter::{KeyInfo, KeyInfoCache, OpenRouterBackend, RateLimit};
pub use parser::{parse_response, parse_response_with, ParseSource, ParsedResponse};
pub use prompt::{build_prompt, HistoryEntry, OPPONENT_LABEL};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, CompletionError>;

//! Scripted completion backend (testing only)
//!
//! Responses are queued per model. When a model's queue runs dry the
//! backend falls back to that model's `always` text, if one was set.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{CompletionBackend, CompletionRequest};
use crate::error::CompletionError;
use crate::Result;

#[derive(Default)]
struct Inner {
    queued: HashMap<String, VecDeque<Result<String>>>,
    always: HashMap<String, String>,
    requests: Vec<CompletionRequest>,
}

/// In-memory [`CompletionBackend`] replaying scripted responses
#[derive(Default)]
pub struct ScriptedBackend {
    inner: Mutex<Inner>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful completion for `model`
    pub fn push_text(&self, model: &str, text: &str) {
        self.push(model, Ok(text.to_string()));
    }

    /// Queue one failure for `model`
    pub fn push_error(&self, model: &str, err: CompletionError) {
        self.push(model, Err(err));
    }

    fn push(&self, model: &str, outcome: Result<String>) {
        self.inner
            .lock()
            .unwrap()
            .queued
            .entry(model.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Answer `text` whenever `model` has nothing queued
    pub fn always(&self, model: &str, text: &str) {
        self.inner
            .lock()
            .unwrap()
            .always
            .insert(model.to_string(), text.to_string());
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Number of requests received for `model`
    pub fn calls_for(&self, model: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.model == model)
            .count()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request.clone());

        if let Some(next) = inner
            .queued
            .get_mut(&request.model)
            .and_then(|queue| queue.pop_front())
        {
            return next;
        }
        if let Some(text) = inner.always.get(&request.model) {
            return Ok(text.clone());
        }
        Err(CompletionError::Transport(format!(
            "no scripted response for {}",
            request.model
        )))
    }
}

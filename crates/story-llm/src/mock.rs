//! Scripted backend for tests and offline development.

use crate::backend::{CompletionRequest, LlmBackend};
use crate::error::LlmError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Replies with queued responses in order, then with the fallback reply.
/// Every request is recorded.
pub struct MockBackend {
    model_id: String,
    scripted: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

impl MockBackend {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            scripted: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the script is exhausted.
    pub fn with_fallback(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(content.into());
        self
    }

    /// Canned replies for offline use: a few stories, a refined story.
    pub fn offline() -> Self {
        Self::new("mock-model").with_fallback(
            r#"{"newStories":[
                {"description":"As a user, I want to sign in so that my work is saved.","priority":"High"},
                {"description":"As a user, I want to export stories so that I can import them elsewhere.","priority":"Medium"},
                {"description":"As an admin, I want to see usage so that I can plan capacity.","priority":"Low"}
            ],"refinedUserStory":"As a user, I want a clearly described story so that the team can estimate it."}"#,
        )
    }

    pub fn push_response(&self, content: impl Into<String>) -> &Self {
        lock(&self.scripted).push_back(Ok(content.into()));
        self
    }

    pub fn push_error(&self, err: LlmError) -> &Self {
        lock(&self.scripted).push_back(Err(err));
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        lock(&self.calls).push(request);
        if let Some(next) = lock(&self.scripted).pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| LlmError::Unavailable("mock backend has no scripted response".to_string()))
    }
}

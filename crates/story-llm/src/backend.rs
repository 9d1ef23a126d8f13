use crate::Result;
use async_trait::async_trait;

/// One single-turn completion: an optional system prompt and a user prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    /// Ask the backend for a JSON object response.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A text-generation backend. Implementations make exactly one attempt per
/// call; there is no retry or caching layer above them.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier, for logs.
    fn id(&self) -> &str;

    /// Raw text content of the model's reply.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

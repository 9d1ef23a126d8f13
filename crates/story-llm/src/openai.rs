//! OpenAI-compatible chat completions backend.
//!
//! Any server exposing `POST {base_url}/chat/completions` works: OpenAI,
//! vLLM, Ollama, LocalAI.

use crate::backend::{CompletionRequest, LlmBackend};
use crate::error::LlmError;
use crate::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storyforge_core::config::LlmConfig;

pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// Build from config, reading the key from `config.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            config.base_url.clone(),
            config.model.clone(),
            Some(api_key),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let mut http = self.client.post(self.chat_completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = http
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %self.model, %status, "chat completion failed");
            return Err(LlmError::RequestFailed(format!("HTTP {status}: {body}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("no content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> OpenAiBackend {
        OpenAiBackend::new(url, "test-model", Some("sk-test".into()), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn sends_bearer_and_json_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "response_format": {"type": "json_object"},
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"{\"ok\":true}"}}]}"#)
            .create_async()
            .await;

        let out = backend(&server.url())
            .complete(CompletionRequest::user("hi").json())
            .await
            .unwrap();
        assert_eq!(out, r#"{"ok":true}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_is_request_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = backend(&server.url())
            .complete(CompletionRequest::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn empty_choices_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = backend(&server.url())
            .complete(CompletionRequest::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn missing_key_env_is_reported() {
        let config = LlmConfig {
            api_key_env: "STORY_LLM_TEST_UNSET_KEY".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            OpenAiBackend::from_config(&config),
            Err(LlmError::MissingApiKey(_))
        ));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let b = backend("http://localhost:1234/v1/");
        assert_eq!(b.chat_completions_url(), "http://localhost:1234/v1/chat/completions");
    }
}

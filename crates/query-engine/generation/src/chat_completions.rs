//! A backend for OpenAI-compatible chat completion endpoints.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use nl_sql_configuration::CompletionConfiguration;
use serde::Serialize;

use crate::completion::{CompletionBackend, CompletionError, Message, Prompt};

pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for ChatCompletionsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsBackend")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsBackend {
    pub fn new(configuration: &CompletionConfiguration) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(configuration.timeout_ms))
            .build()
            .map_err(|err| CompletionError::Transport(err.to_string()))?;
        Ok(ChatCompletionsBackend {
            client,
            endpoint: configuration.endpoint.clone(),
            model: configuration.model.clone(),
            api_key: configuration.api_key.clone(),
            max_tokens: configuration.max_tokens,
            temperature: configuration.temperature,
        })
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: &prompt.messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "completion service returned an error");
            return Err(CompletionError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        completion_text(&body)
            .ok_or_else(|| CompletionError::Malformed("no completion text found".to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout
    } else {
        // without the url, which may carry credentials
        CompletionError::Transport(err.without_url().to_string())
    }
}

/// Find the completion text in the response shapes used by the vendors we
/// know about: `choices[0].message.content` (chat), `choices[0].text`
/// (legacy completions) and `content[*].text` (content blocks).
pub fn completion_text(body: &serde_json::Value) -> Option<String> {
    if let Some(choice) = body.pointer("/choices/0") {
        if let Some(content) = choice.pointer("/message/content").and_then(|c| c.as_str()) {
            return Some(content.to_string());
        }
        if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
            return Some(text.to_string());
        }
    }
    let blocks = body.get("content")?.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat())
    }
}

//! Chat backend trait and its OpenAI-compatible implementation.
//!
//! `ApiChatBackend` calls any `/v1/chat/completions` endpoint that speaks the
//! OpenAI wire format.  All connection details come from
//! [`AssistantConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AssistantConfig;

// ---------------------------------------------------------------------------
// AssistantError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssistantError {
    /// HTTP transport or connection error, or a non-success status.
    #[error("chat request failed: {0}")]
    Request(String),

    #[error("chat request timed out")]
    Timeout,

    #[error("failed to parse chat response: {0}")]
    Parse(String),

    #[error("assistant returned an empty response")]
    EmptyResponse,

    #[error("assistant is disabled in settings")]
    Disabled,
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AssistantError::Timeout
        } else {
            AssistantError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatBackend trait
// ---------------------------------------------------------------------------

/// One chat-completion round trip.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistantError>;
}

// ---------------------------------------------------------------------------
// ApiChatBackend
// ---------------------------------------------------------------------------

pub struct ApiChatBackend {
    client: reqwest::Client,
    config: AssistantConfig,
}

impl ApiChatBackend {
    /// The HTTP client carries the timeout from `config.timeout_secs`.
    pub fn from_config(config: &AssistantConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ChatBackend for ApiChatBackend {
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is a non-empty string.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AssistantError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = serde_json::json!({
            "model":       self.config.model,
            "messages":    messages,
            "stream":      false,
            "temperature": self.config.temperature,
        });

        let mut req = self.client.post(&url).json(&body);
        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Request(format!("HTTP {status}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Parse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(AssistantError::EmptyResponse)?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(AssistantError::EmptyResponse);
        }
        Ok(content)
    }
}

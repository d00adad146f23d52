//! Chat-completion providers used for relevance checks and answers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default OpenAI chat model.
pub const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
/// Default Anthropic API root.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Errors produced by chat providers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Invalid provider configuration.
    #[error("invalid provider configuration: {0}")]
    Config(String),
    /// Transport failure after exhausting retries.
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status.
    #[error("{provider} returned {status}: {body}")]
    Status {
        /// Provider name.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Response carried no text.
    #[error("{0} response missing text content")]
    Empty(&'static str),
}

/// Request envelope shared by the providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System instructions.
    pub system: String,
    /// User turn.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: usize,
}

/// A chat model that answers one system + user exchange.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Short provider label for logs.
    fn name(&self) -> &'static str;

    /// Returns the model's reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Connection settings shared by the providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key.
    pub api_key: String,
    /// API root.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
}

fn build_client(timeout: Duration, headers: HeaderMap) -> Result<Client, LlmError> {
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

async fn post_with_retry<B: Serialize + Sync>(
    client: &Client,
    endpoint: &str,
    body: &B,
    retry: RetryPolicy,
    provider: &'static str,
) -> Result<Response, LlmError> {
    let mut attempt = 0usize;
    loop {
        match client.post(endpoint).json(body).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status();
                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if retry.should_retry(status) && retry.can_retry(attempt) {
                    attempt += 1;
                    tracing::warn!(provider, %status, attempt, "retrying chat request");
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    continue;
                }
                return Err(LlmError::Status {
                    provider,
                    status: status.as_u16(),
                    body: text,
                });
            }
            Err(err) => {
                if retry.is_retryable_error(&err) && retry.can_retry(attempt) {
                    attempt += 1;
                    tracing::warn!(provider, error = %err, attempt, "retrying chat request");
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
}

/// OpenAI chat completions.
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiChat {
    /// Builds the provider.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("missing OpenAI API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| LlmError::Config("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            client: build_client(config.timeout, headers)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model,
            retry: config.retry,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = OpenAiRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: &request.system,
                },
                OpenAiMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };
        let resp = post_with_retry(
            &self.client,
            &self.endpoint,
            &body,
            self.retry,
            self.name(),
        )
        .await?;
        let parsed: OpenAiResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .find(|content| !content.trim().is_empty())
            .ok_or(LlmError::Empty("OpenAI"))
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// Anthropic messages API.
pub struct AnthropicChat {
    client: Client,
    endpoint: String,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicChat {
    /// Builds the provider.
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("missing Anthropic API key".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(config.api_key.trim())
                .map_err(|_| LlmError::Config("invalid Anthropic API key".into()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            client: build_client(config.timeout, headers)?,
            endpoint: format!("{}/messages", config.base_url.trim_end_matches('/')),
            model: config.model,
            retry: config.retry,
        })
    }
}

#[async_trait]
impl ChatProvider for AnthropicChat {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: &request.user,
                }],
            }],
        };
        let resp = post_with_retry(
            &self.client,
            &self.endpoint,
            &body,
            self.retry,
            self.name(),
        )
        .await?;
        let parsed: AnthropicResponse = resp.json().await?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.trim().is_empty() {
            return Err(LlmError::Empty("Anthropic"));
        }
        Ok(answer)
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

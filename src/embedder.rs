//! Embedding clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default OpenAI-compatible API root.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

/// Errors produced by embedding clients.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Invalid client configuration.
    #[error("invalid embedder configuration: {0}")]
    Config(String),
    /// Transport failure after exhausting retries.
    #[error("embeddings request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status from the API.
    #[error("embeddings request failed ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// Response had a different number of vectors than inputs.
    #[error("embeddings API returned {got} vectors for {expected} inputs")]
    CountMismatch {
        /// Inputs sent.
        expected: usize,
        /// Vectors received.
        got: usize,
    },
    /// Response indices were not exactly `0..n`.
    #[error("embeddings API returned index {got} at position {expected}")]
    IndexMismatch {
        /// Position the vector should fill.
        expected: usize,
        /// Index the API reported there.
        got: usize,
    },
}

/// Anything that turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds `inputs`, returning one vector per input in the same order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embeds a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors.pop().ok_or(EmbedError::CountMismatch {
            expected: 1,
            got: 0,
        })
    }
}

/// Settings for [`OpenAiEmbedder`].
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// Bearer token.
    pub api_key: String,
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Optional output dimensionality.
    pub dimensions: Option<usize>,
    /// Request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Maximum inputs per request.
    pub batch_size: usize,
}

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a new embeddings client.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self, EmbedError> {
        if config.api_key.trim().is_empty() {
            return Err(EmbedError::Config("missing OpenAI API key".into()));
        }
        if config.model.trim().is_empty() {
            return Err(EmbedError::Config("missing embedding model name".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbedError::Config("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model: config.model,
            dimensions: config.dimensions,
            retry: config.retry,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Maximum batch size configured for this client.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: self.dimensions,
            };
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().await?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(EmbedError::CountMismatch {
                                expected: inputs.len(),
                                got: parsed.data.len(),
                            });
                        }
                        return into_ordered_vectors(parsed.data);
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if self.retry.should_retry(status) && self.retry.can_retry(attempt) {
                        attempt += 1;
                        tracing::warn!(%status, attempt, "retrying embeddings request");
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbedError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if self.retry.is_retryable_error(&err) && self.retry.can_retry(attempt) {
                        attempt += 1;
                        tracing::warn!(error = %err, attempt, "retrying embeddings request");
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        tracing::debug!(inputs = inputs.len(), model = %self.model, "embedded inputs");
        Ok(vectors)
    }
}

/// Vectors in input order; indices must cover `0..n` once each.
fn into_ordered_vectors(data: Vec<EmbeddingData>) -> Result<Vec<Vec<f32>>, EmbedError> {
    data.into_iter()
        .enumerate()
        .map(|(position, entry)| {
            if entry.index == position {
                Ok(entry.embedding)
            } else {
                Err(EmbedError::IndexMismatch {
                    expected: position,
                    got: entry.index,
                })
            }
        })
        .collect()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

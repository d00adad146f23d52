//! Fetches the program pages and turns them into [`ProgramSnapshot`]s.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::normalizer::{FetchedPage, NormalizationConfig, NormalizationError, Normalizer};
use crate::profile::extract_profile;
use crate::program::ProgramId;
use crate::retry::RetryPolicy;
use crate::snapshot::ProgramSnapshot;

/// Default user agent sent with page requests.
pub const DEFAULT_USER_AGENT: &str = "masters-advisor/0.1 (+https://abit.itmo.ru)";

/// Errors raised while collecting or persisting program pages.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Transport failure after exhausting retries.
    #[error("request to {url} failed: {source}")]
    Http {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// Non-success status.
    #[error("{url} returned {status}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// Page could not be normalized.
    #[error("failed to normalize {url}: {source}")]
    Normalize {
        /// Target URL.
        url: String,
        /// Normalizer error.
        #[source]
        source: NormalizationError,
    },
    /// Page parsed but produced no text.
    #[error("{url} contained no extractable text")]
    NoContent {
        /// Target URL.
        url: String,
    },
    /// Could not build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// Snapshot file I/O failure.
    #[error("snapshot I/O at {path:?}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Snapshot (de)serialization failure.
    #[error("invalid snapshot at {path:?}: {source}")]
    Snapshot {
        /// Snapshot file.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Collector tuning knobs.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// User agent header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Pause between consecutive page fetches.
    pub politeness_delay: Duration,
    /// HTML normalization settings.
    pub normalization: NormalizationConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            politeness_delay: Duration::from_millis(250),
            normalization: NormalizationConfig::default(),
        }
    }
}

/// A program and the page it is scraped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectTarget {
    /// Program identifier.
    pub program: ProgramId,
    /// Page URL.
    pub url: Url,
}

impl CollectTarget {
    /// Targets for both programs, with URLs resolved against `base`
    /// when given (used to point at a mirror or a test server).
    pub fn defaults(base: Option<&Url>) -> Result<Vec<Self>, url::ParseError> {
        ProgramId::ALL
            .iter()
            .map(|&program| {
                let url = match base {
                    Some(base) => base.join(&format!("program/master/{}", program.slug()))?,
                    None => Url::parse(program.default_url())?,
                };
                Ok(Self { program, url })
            })
            .collect()
    }
}

/// Async page collector.
pub struct Collector {
    client: Client,
    config: CollectorConfig,
    normalizer: Normalizer,
}

impl Collector {
    /// Builds a collector with its own HTTP client.
    pub fn new(config: CollectorConfig) -> Result<Self, CollectError> {
        let agent = HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(USER_AGENT, agent);
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(CollectError::Client)?;
        let normalizer = Normalizer::new(config.normalization);
        Ok(Self {
            client,
            config,
            normalizer,
        })
    }

    /// Collects every target in order, pausing between fetches.
    pub async fn collect_all(
        &self,
        targets: &[CollectTarget],
    ) -> Result<Vec<ProgramSnapshot>, CollectError> {
        let mut snapshots = Vec::with_capacity(targets.len());
        for (idx, target) in targets.iter().enumerate() {
            if idx > 0 && !self.config.politeness_delay.is_zero() {
                tokio::time::sleep(self.config.politeness_delay).await;
            }
            snapshots.push(self.collect(target).await?);
        }
        Ok(snapshots)
    }

    /// Fetches, normalizes and profiles one program page.
    pub async fn collect(&self, target: &CollectTarget) -> Result<ProgramSnapshot, CollectError> {
        let page = self.fetch(&target.url).await?;
        let normalized = self
            .normalizer
            .normalize(&page)
            .map_err(|source| CollectError::Normalize {
                url: target.url.to_string(),
                source,
            })?;
        if normalized.blocks.is_empty() || normalized.chunks.is_empty() {
            return Err(CollectError::NoContent {
                url: target.url.to_string(),
            });
        }

        let profile = extract_profile(target.program, &normalized);
        tracing::info!(
            program = target.program.slug(),
            url = %target.url,
            blocks = normalized.blocks.len(),
            chunks = normalized.chunks.len(),
            courses = profile.courses.len(),
            "collected program page"
        );

        Ok(ProgramSnapshot {
            program: target.program,
            metadata: normalized.metadata,
            profile,
            chunks: normalized.chunks,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<FetchedPage, CollectError> {
        let retry = self.config.retry;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let final_url = resp.url().clone();
                        let headers = resp.headers().clone();
                        let body = resp.bytes().await.map_err(|source| CollectError::Http {
                            url: url.to_string(),
                            source,
                        })?;
                        return Ok(FetchedPage::new(
                            final_url,
                            SystemTime::now(),
                            status.as_u16(),
                            headers,
                            body.to_vec(),
                        ));
                    }
                    if retry.should_retry(status) && retry.can_retry(attempt) {
                        attempt += 1;
                        tracing::warn!(%url, %status, attempt, "retrying page fetch");
                        tokio::time::sleep(retry.backoff(attempt)).await;
                        continue;
                    }
                    return Err(CollectError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(err) => {
                    if retry.is_retryable_error(&err) && retry.can_retry(attempt) {
                        attempt += 1;
                        tracing::warn!(%url, error = %err, attempt, "retrying page fetch");
                        tokio::time::sleep(retry.backoff(attempt)).await;
                        continue;
                    }
                    return Err(CollectError::Http {
                        url: url.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_point_at_itmo() {
        let targets = CollectTarget::defaults(None).unwrap();
        let urls: Vec<&str> = targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://abit.itmo.ru/program/master/ai",
                "https://abit.itmo.ru/program/master/ai_product"
            ]
        );
    }

    #[test]
    fn targets_resolve_against_mirror() {
        let base = Url::parse("http://127.0.0.1:9000/").unwrap();
        let targets = CollectTarget::defaults(Some(&base)).unwrap();
        assert_eq!(
            targets[1].url.as_str(),
            "http://127.0.0.1:9000/program/master/ai_product"
        );
        assert_eq!(targets[1].program, ProgramId::AiProduct);
    }
}

//! Retrying Figma API client.

use crate::error::SyncError;
use crate::types::{ClientConfig, RetryConfig};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

/// Header carrying the personal access token.
pub const FIGMA_TOKEN_HEADER: &str = "X-Figma-Token";

/// Authenticated client for the Figma REST API and the signed asset URLs it hands out.
///
/// Cloning is cheap and clones share one connection pool. Requests carry no
/// state besides the static token header, so the client can be used from many
/// tasks at once.
#[derive(Clone, Debug)]
pub struct FigmaClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl FigmaClient {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let mut token = HeaderValue::from_str(&config.token)
            .map_err(|e| SyncError::InvalidToken(e.to_string()))?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(FIGMA_TOKEN_HEADER, token);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(concat!("figsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retry: config.retry.clone(),
        })
    }

    /// GETs `<base>/<path>?<query>` and deserializes the JSON body.
    ///
    /// A body that does not match `T` is a [`SyncError::MalformedResponse`] and is not retried.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SyncError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let body = self.fetch(&url, query).await?;
        debug!(url = %url, response = %String::from_utf8_lossy(&body), "API response");

        serde_json::from_slice(&body)
            .map_err(|e| SyncError::MalformedResponse(format!("{} from {}", e, url)))
    }

    /// Downloads the raw bytes behind an absolute URL.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        debug!("Downloading {}", url);
        let bytes = self.fetch(url, &[]).await?;
        debug!("Received {} bytes.", bytes.len());
        Ok(bytes)
    }

    /// Runs one logical request under the retry policy.
    ///
    /// Transport failures retry immediately, 429 sleeps `rate_limit_wait` first. Both draw on
    /// the same budget of `max_retries`, so sustained rate limiting ends in
    /// [`SyncError::RetriesExhausted`]. Any other non-2xx status fails at once.
    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, SyncError> {
        let strategy = FixedInterval::from_millis(0).take(self.retry.max_retries);
        let rate_limit_wait = self.retry.rate_limit_wait;

        let result = Retry::spawn(strategy, || async move {
            match self.fetch_once(url, query).await {
                Ok(body) => Ok(body),
                Err(e @ SyncError::RateLimited { .. }) => {
                    warn!(
                        "Too Many Requests received from {}. Sleeping {}...",
                        url,
                        humantime::format_duration(rate_limit_wait)
                    );
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: Some(rate_limit_wait),
                    })
                }
                Err(e) if e.is_retryable() => {
                    warn!("Request failed with {}. Retrying...", e);
                    RetryError::to_transient(e)
                }
                Err(e) => RetryError::to_permanent(e),
            }
        })
        .await;

        result.map_err(|e| {
            if e.is_retryable() {
                SyncError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: self.retry.max_retries + 1,
                    source: Box::new(e),
                }
            } else {
                e
            }
        })
    }

    async fn fetch_once(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, SyncError> {
        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let content_length = response.content_length();
        let mut body = Vec::with_capacity(content_length.unwrap_or(0) as usize);
        let mut byte_stream = response.bytes_stream();
        while let Some(piece) = byte_stream.next().await {
            body.extend_from_slice(&piece?);
        }

        if let Some(expected) = content_length {
            if body.len() as u64 != expected {
                return Err(SyncError::IncompleteBody {
                    url: url.to_string(),
                    expected,
                    received: body.len() as u64,
                });
            }
        }

        Ok(body)
    }
}

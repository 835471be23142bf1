//! HTTP client for fetching source images

use bytes::{Bytes, BytesMut};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::humanize::ByteSize;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: ByteSize },
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Whole-request budget for one attempt, body included
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_image_bytes: ByteSize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("pagefetch/", env!("CARGO_PKG_VERSION")).to_string(),
            max_image_bytes: ByteSize::mib(32),
        }
    }
}

/// Image fetcher; one call is one attempt
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_image_bytes: ByteSize,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            max_image_bytes: config.max_image_bytes,
        })
    }

    /// Fetch `url` once. Non-2xx, timeouts and oversized bodies are errors.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        debug!(url, "Starting fetch");

        let mut response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let limit = self.max_image_bytes;
        if let Some(size) = response.content_length() {
            if size > limit.as_u64() {
                return Err(DownloadError::TooLarge { size, limit });
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit.as_u64() {
                return Err(DownloadError::TooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, size = body.len(), "Fetch completed");

        Ok(body.freeze())
    }
}

fn classify(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else if e.is_redirect() {
        DownloadError::TooManyRedirects
    } else if e.is_builder() {
        DownloadError::InvalidUrl(e.to_string())
    } else {
        DownloadError::RequestFailed(e.to_string())
    }
}

//! HTTP fetcher implementation
//!
//! This module handles single request attempts:
//! - Building the shared HTTP client with the identifying user agent
//! - Per-attempt read timeouts that grow with the attempt number
//! - Bounded body reads
//! - Classifying transport failures
//!
//! Retrying is decided elsewhere (see `retry`).

use crate::config::Config;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// Transport-level failure of one attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl FetchError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_connect() {
            FetchError::Connect(error.to_string())
        } else {
            FetchError::Other(error.to_string())
        }
    }
}

/// Result of one request attempt
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The server answered; any status code
    Response {
        status: u16,
        /// URL after redirects
        final_url: Url,
        content_type: Option<String>,
        body: Vec<u8>,
        /// Parsed `Retry-After` header
        retry_after: Option<Duration>,
    },

    Error(FetchError),
}

impl FetchOutcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchOutcome::Response { status, .. } => Some(*status),
            FetchOutcome::Error(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status(), Some(200..=299))
    }

    /// True when the response declares an HTML (or XHTML) body
    pub fn is_html(&self) -> bool {
        match self {
            FetchOutcome::Response {
                content_type: Some(content_type),
                ..
            } => {
                let content_type = content_type.to_ascii_lowercase();
                content_type.contains("text/html") || content_type.contains("application/xhtml")
            }
            _ => false,
        }
    }
}

/// Performs one request attempt
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `address`; `attempt` is 0 for the first try
    async fn fetch(&self, address: &Url, attempt: u32) -> FetchOutcome;
}

/// Builds the HTTP client shared by page and robots.txt requests
///
/// The client sends `{name}/{version} (+{contact-url})` (or the configured
/// header verbatim), follows up to 10 redirects and reuses pooled
/// connections per host. Read timeouts are set per request.
///
/// # Example
///
/// ```no_run
/// use legal_spider::config::Config;
/// use legal_spider::crawler::build_http_client;
///
/// let client = build_http_client(&Config::default()).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .default_headers(headers)
        .connect_timeout(config.http.connect_timeout())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by a `reqwest` client
pub struct HttpFetcher {
    client: Client,
    read_timeout: Duration,
    timeout_multiplier: f64,
    max_content_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            read_timeout: config.http.read_timeout(),
            timeout_multiplier: config.http.timeout_multiplier,
            max_content_bytes: config.http.max_content_bytes,
        }
    }

    /// Read timeout for an attempt: grows by the multiplier, never past 2x
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        let factor = self
            .timeout_multiplier
            .max(1.0)
            .powi(attempt as i32)
            .min(2.0);
        self.read_timeout.mul_f64(factor)
    }

    async fn send(&self, address: &Url, attempt: u32) -> Result<FetchOutcome, reqwest::Error> {
        let mut response = self
            .client
            .get(address.clone())
            .timeout(self.attempt_timeout(attempt))
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let retry_after = header_string(response.headers(), RETRY_AFTER)
            .and_then(|value| parse_retry_after(&value));

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_content_bytes - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_content_bytes {
                tracing::warn!(
                    "Truncated {} at {} bytes",
                    address,
                    self.max_content_bytes
                );
                break;
            }
        }

        Ok(FetchOutcome::Response {
            status,
            final_url,
            content_type,
            body,
            retry_after,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, address: &Url, attempt: u32) -> FetchOutcome {
        tracing::debug!("GET {} (attempt {})", address, attempt + 1);
        match self.send(address, attempt).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Error(FetchError::from_reqwest(e)),
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

/// Parses a `Retry-After` value given as delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

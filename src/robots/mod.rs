//! Robots.txt handling module
//!
//! Fetching, parsing and caching of per-domain crawl policy. Any failure to
//! obtain a policy is logged and treated as "everything allowed".

mod cache;
mod parser;

pub use cache::PolicyCache;
pub use parser::{pattern_matches, DomainPolicy, PolicyGroup, PolicyRule};

use crate::config::PolicyConfig;
use crate::url::robots_url;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Crawl policy lookups used by the coordinator and the rate limiter
#[async_trait]
pub trait CrawlPolicy: Send + Sync {
    /// Checks if `address` may be fetched by `user_agent`
    ///
    /// Fetches the domain's policy first if it is not cached yet.
    async fn is_allowed(&self, address: &Url, user_agent: &str) -> bool;

    /// Crawl delay in seconds for a domain, from the cache only
    fn crawl_delay(&self, domain: &str) -> Option<f64>;

    fn stats(&self) -> PolicyStats {
        PolicyStats::default()
    }
}

/// Cache and fetch settings
#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub ttl: chrono::Duration,
    pub fetch_timeout: Duration,
    pub max_bytes: usize,
    pub allow_wins_ties: bool,
}

impl From<&PolicyConfig> for PolicySettings {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            ttl: chrono::Duration::hours(i64::from(config.cache_ttl_hours)),
            fetch_timeout: config.fetch_timeout(),
            max_bytes: config.max_bytes,
            allow_wins_ties: config.allow_wins_ties,
        }
    }
}

/// Policy cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyStats {
    pub domains_cached: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub checks: u64,
    pub disallowed: u64,
    pub stale_served: u64,
}

/// Reasons a robots.txt could not be obtained
#[derive(Debug, Error)]
pub enum PolicyFetchError {
    #[error("robots.txt request timed out")]
    Timeout,

    #[error("robots.txt returned HTTP {0}")]
    Status(u16),

    #[error("robots.txt request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no robots.txt location for {0}")]
    NoLocation(String),
}

/// Fetches and parses robots.txt for the origin of `address`
///
/// Never fails: any error yields [`DomainPolicy::unavailable`].
pub async fn fetch_robots(
    client: &Client,
    address: &Url,
    domain: &str,
    settings: &PolicySettings,
) -> DomainPolicy {
    match download_robots(client, address, settings).await {
        Ok(content) => {
            let policy = DomainPolicy::parse(domain, &content);
            tracing::debug!(
                "Loaded robots.txt for {} ({} groups)",
                domain,
                policy.groups.len()
            );
            policy
        }
        Err(e) => {
            tracing::warn!("Could not load robots.txt for {}: {} (allowing all)", domain, e);
            DomainPolicy::unavailable(domain)
        }
    }
}

async fn download_robots(
    client: &Client,
    address: &Url,
    settings: &PolicySettings,
) -> Result<String, PolicyFetchError> {
    let location =
        robots_url(address).ok_or_else(|| PolicyFetchError::NoLocation(address.to_string()))?;

    let mut response = client
        .get(location)
        .timeout(settings.fetch_timeout)
        .send()
        .await
        .map_err(classify_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(PolicyFetchError::Status(status.as_u16()));
    }

    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(classify_error)? {
        let room = settings.max_bytes - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= settings.max_bytes {
            tracing::debug!("robots.txt truncated at {} bytes", settings.max_bytes);
            break;
        }
    }

    Ok(decode_body(body))
}

fn classify_error(error: reqwest::Error) -> PolicyFetchError {
    if error.is_timeout() {
        PolicyFetchError::Timeout
    } else {
        PolicyFetchError::Http(error)
    }
}

/// Decodes a robots.txt body as UTF-8, falling back to Latin-1
///
/// A multi-byte sequence cut off by truncation at the very end is dropped
/// rather than forcing the fallback.
pub fn decode_body(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let utf8_error = e.utf8_error();
            let bytes = e.into_bytes();
            if utf8_error.error_len().is_none() {
                let valid = &bytes[..utf8_error.valid_up_to()];
                return String::from_utf8_lossy(valid).into_owned();
            }
            bytes.iter().map(|&b| char::from(b)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(max_bytes: usize) -> PolicySettings {
        PolicySettings {
            ttl: chrono::Duration::hours(24),
            fetch_timeout: Duration::from_millis(500),
            max_bytes,
            allow_wins_ties: true,
        }
    }

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode_body("Disallow: /ü".as_bytes().to_vec()), "Disallow: /ü");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // 0xE9 is 'é' in Latin-1 and invalid as a lone UTF-8 byte
        let bytes = vec![b'/', b'c', b'a', b'f', 0xE9, b'/'];
        assert_eq!(decode_body(bytes), "/café/");
    }

    #[test]
    fn test_decode_truncated_multibyte_tail() {
        let mut bytes = "Allow: /".as_bytes().to_vec();
        bytes.push(0xC3); // first half of a two-byte sequence
        assert_eq!(decode_body(bytes), "Allow: /");
    }

    #[test]
    fn test_settings_from_config() {
        let settings = PolicySettings::from(&PolicyConfig::default());
        assert_eq!(settings.ttl, chrono::Duration::hours(24));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_bytes, 500 * 1024);
        assert!(settings.allow_wins_ties);
    }

    #[tokio::test]
    async fn test_missing_robots_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let address = Url::parse(&server.uri()).unwrap();
        let policy = fetch_robots(&Client::new(), &address, "d", &settings(1024)).await;
        assert!(!policy.valid);
    }

    #[tokio::test]
    async fn test_slow_robots_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let address = Url::parse(&server.uri()).unwrap();
        let policy = fetch_robots(&Client::new(), &address, "d", &settings(1024)).await;
        assert!(!policy.valid);
        assert!(policy.is_allowed("/", "AnyBot", true));
    }

    #[tokio::test]
    async fn test_oversized_body_is_truncated() {
        let server = MockServer::start().await;
        let mut content = String::from("User-agent: *\nDisallow: /early\n");
        content.push_str(&"# padding\n".repeat(200));
        content.push_str("Disallow: /late\n");
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(content))
            .mount(&server)
            .await;

        let address = Url::parse(&server.uri()).unwrap();
        let policy = fetch_robots(&Client::new(), &address, "d", &settings(256)).await;
        assert!(policy.valid);
        assert!(!policy.is_allowed("/early", "AnyBot", true));
        assert!(policy.is_allowed("/late", "AnyBot", true));
    }
}

//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier of addresses waiting to be crawled
//! - Per-domain rate limiting
//! - HTTP fetching with retry logic
//! - HTML parsing and link extraction
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod rate_limiter;
mod retry;

pub use coordinator::{Components, Coordinator};
pub use fetcher::{
    build_http_client, parse_retry_after, FetchError, FetchOutcome, Fetcher, HttpFetcher,
};
pub use frontier::{AddOutcome, Frontier, FrontierItem, FrontierPoll, FrontierStats};
pub use parser::{parse_html, HtmlLinkExtractor, LinkExtractor, ParsedPage};
pub use rate_limiter::{Admission, DomainRateLimiter, RateLimiter};
pub use retry::{
    ExecutionReport, FetchExecutor, HttpStats, RetryDecision, RetryPolicy, MAX_RETRY_AFTER,
};

use crate::config::Config;
use crate::output::CrawlReport;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for a crawl without external cancellation.
/// It will:
/// 1. Validate the configuration
/// 2. Wire the HTTP client, robots.txt cache, rate limiter and safety gate
/// 3. Crawl from the seed until the frontier or page budget is exhausted
/// 4. Return the report
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl ran to completion
/// * `Err(SpiderError)` - Setup failed; individual page failures never end up here
pub async fn crawl(config: Config) -> Result<CrawlReport> {
    Coordinator::new(config)?.run(CancellationToken::new()).await
}

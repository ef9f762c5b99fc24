//! Legal Spider: a compliance-constrained web crawler
//!
//! This crate crawls a single site from a seed address while obeying robots.txt,
//! per-domain rate limits and safety exclusions for authentication and
//! administrative areas. It produces a per-page result list and run statistics.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod safety;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for crawl runs
///
/// Only setup problems surface here. Failures of individual fetches are
/// recorded in [`output::CrawlResult`] and never abort a run.
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, SpiderError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{crawl, Coordinator};
pub use output::{CrawlReport, CrawlResult, CrawlStats, StatusClass};
pub use state::PageState;
pub use url::{extract_domain, is_same_domain, normalize_url};

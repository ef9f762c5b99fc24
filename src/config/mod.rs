//! Configuration module for Legal Spider
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and applying command-line / environment overrides on top of them.
//!
//! # Example
//!
//! ```no_run
//! use legal_spider::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("spider.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, HttpConfig, OutputConfig, PolicyConfig, RateLimitConfig,
    SafetyConfig, UserAgentConfig, DEFAULT_AUTH_PATTERNS, DEFAULT_EXCLUDED_EXTENSIONS,
    DEFAULT_EXCLUDED_PATHS,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, hash_content, load_config, load_config_with_hash, parse_config_file,
    ConfigOverrides,
};
pub use validation::validate;

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use legal_spider::config::load_config;
///
/// let config = load_config(Path::new("spider.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = parse_config_file(path)?;
    validate(&config)?;
    Ok(config)
}

/// Reads and parses a configuration file without validating it
///
/// Used when command-line overrides still have to be applied before the
/// configuration is complete (for example when the seed comes from the CLI).
pub fn parse_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is recorded in the crawl report so a result set can be tied back
/// to the exact configuration that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Hex-encoded SHA-256 of arbitrary configuration text
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Values supplied on the command line or through `SPIDER_*` variables
///
/// `None` leaves the file (or default) value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub seed: Option<String>,
    pub max_pages: Option<u32>,
    pub max_depth: Option<u32>,
    pub requests_per_second: Option<f64>,
    pub max_concurrent_requests: Option<u32>,
    pub user_agent: Option<String>,
    pub results_path: Option<String>,
    pub ignore_robots: bool,
    pub allow_auth_pages: bool,
    pub allow_forms: bool,
}

impl Config {
    /// Applies overrides on top of this configuration
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(seed) = overrides.seed {
            self.crawler.seed = seed;
        }
        if let Some(max_pages) = overrides.max_pages {
            self.crawler.max_pages = max_pages;
        }
        if let Some(max_depth) = overrides.max_depth {
            self.crawler.max_depth = max_depth;
        }
        if let Some(rps) = overrides.requests_per_second {
            self.rate_limit.requests_per_second = rps;
        }
        if let Some(workers) = overrides.max_concurrent_requests {
            self.crawler.max_concurrent_requests = workers;
        }
        if let Some(user_agent) = overrides.user_agent {
            self.user_agent.header = Some(user_agent);
        }
        if let Some(path) = overrides.results_path {
            self.output.results_path = Some(path);
        }
        if overrides.ignore_robots {
            self.policy.respect_robots = false;
        }
        if overrides.allow_auth_pages {
            self.safety.avoid_auth_pages = false;
        }
        if overrides.allow_forms {
            self.safety.avoid_forms = false;
        }
    }
}

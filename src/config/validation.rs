use crate::config::types::{
    Config, CrawlerConfig, HttpConfig, PolicyConfig, RateLimitConfig, SafetyConfig,
    UserAgentConfig, MAX_BACKOFF_FACTOR, MAX_CONNECT_TIMEOUT_SECS, MAX_CRAWL_DELAY_SECS,
    MAX_NETWORK_RETRY_DELAY_SECS, MAX_POLICY_FETCH_TIMEOUT_SECS, MAX_READ_TIMEOUT_SECS,
};
use crate::ConfigError;
use regex::RegexBuilder;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_http_config(&config.http)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_policy_config(&config.policy)?;
    validate_safety_config(&config.safety)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_seed(&config.seed)?;

    if config.max_depth > 10 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be between 0 and 10, got {}",
            config.max_depth
        )));
    }

    if config.max_pages < 1 || config.max_pages > 10_000 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and 10000, got {}",
            config.max_pages
        )));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 64, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.frontier_capacity == Some(0) {
        return Err(ConfigError::Validation(
            "frontier_capacity must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_seed(seed: &str) -> Result<(), ConfigError> {
    if seed.is_empty() {
        return Err(ConfigError::Validation(
            "a seed URL is required (crawler.seed, --seed or SPIDER_START_URL)".to_string(),
        ));
    }

    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if let Some(header) = &config.header {
        if header.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user agent header cannot be empty".to_string(),
            ));
        }
        return Ok(());
    }

    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    check_positive("timeout_connect", config.timeout_connect, MAX_CONNECT_TIMEOUT_SECS)?;
    check_positive("timeout_read", config.timeout_read, MAX_READ_TIMEOUT_SECS)?;

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    check_non_negative("backoff_factor", config.backoff_factor, MAX_BACKOFF_FACTOR)?;

    if !(1.0..=2.0).contains(&config.timeout_multiplier) {
        return Err(ConfigError::Validation(format!(
            "timeout_multiplier must be between 1.0 and 2.0, got {}",
            config.timeout_multiplier
        )));
    }

    check_non_negative(
        "network_retry_delay",
        config.network_retry_delay,
        MAX_NETWORK_RETRY_DELAY_SECS,
    )?;

    if config.max_content_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_content_bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    check_positive("requests_per_second", config.requests_per_second, 10.0)?;

    if config.burst_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "burst_capacity must be >= 1, got {}",
            config.burst_capacity
        )));
    }

    check_non_negative("max_crawl_delay", config.max_crawl_delay, MAX_CRAWL_DELAY_SECS)?;

    Ok(())
}

fn validate_policy_config(config: &PolicyConfig) -> Result<(), ConfigError> {
    check_positive(
        "robots fetch_timeout",
        config.fetch_timeout,
        MAX_POLICY_FETCH_TIMEOUT_SECS,
    )?;

    if config.max_bytes == 0 {
        return Err(ConfigError::Validation(
            "robots max_bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Requires a finite value in `(0, max]`
///
/// Written as a positive range check so NaN is rejected too.
fn check_positive(name: &str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= max {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "{} must be in (0, {}], got {}",
        name, max, value
    )))
}

/// Requires a finite value in `[0, max]`
fn check_non_negative(name: &str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "{} must be in [0, {}], got {}",
        name, max, value
    )))
}

fn validate_safety_config(config: &SafetyConfig) -> Result<(), ConfigError> {
    if config.max_url_length < 16 {
        return Err(ConfigError::Validation(format!(
            "max_url_length must be >= 16, got {}",
            config.max_url_length
        )));
    }

    for extension in &config.excluded_extensions {
        if extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::InvalidPattern(format!(
                "excluded extension '{}' is empty",
                extension
            )));
        }
    }

    for pattern in &config.auth_patterns {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                ConfigError::InvalidPattern(format!("auth pattern '{}': {}", pattern, e))
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.crawler.seed = "https://example.com/".to_string();
        config
    }

    #[test]
    fn test_default_config_with_seed_is_valid() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_seed() {
        assert!(validate_seed("https://example.com/").is_ok());
        assert!(validate_seed("http://127.0.0.1:8080/start").is_ok());

        assert!(validate_seed("").is_err());
        assert!(validate_seed("not a url").is_err());
        assert!(validate_seed("ftp://example.com/").is_err());
        assert!(validate_seed("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_extent_limits() {
        let mut config = valid_config();
        config.crawler.max_depth = 11;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.crawler.max_pages = 10_001;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.crawler.max_depth = 0;
        config.crawler.max_pages = 1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_timeouts() {
        let mut config = valid_config();
        config.http.timeout_connect = 0.0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.timeout_connect = 61.0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.timeout_read = -1.0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.timeout_multiplier = 2.5;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.policy.fetch_timeout = 10.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rate_limits() {
        let mut config = valid_config();
        config.rate_limit.requests_per_second = 0.0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.requests_per_second = 10.5;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.burst_capacity = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut config = valid_config();
        config.http.timeout_connect = f64::NAN;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.timeout_read = f64::INFINITY;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.backoff_factor = f64::NAN;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.network_retry_delay = f64::INFINITY;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.requests_per_second = f64::NAN;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.policy.fetch_timeout = f64::NAN;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.max_crawl_delay = f64::NAN;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_oversized_values_rejected() {
        let mut config = valid_config();
        config.http.backoff_factor = 200.0;
        config.http.max_retries = 10;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.timeout_read = 1e300;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.network_retry_delay = 61.0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.max_crawl_delay = 86_400.0;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.http.backoff_factor = 10.0;
        config.http.timeout_read = 300.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_non_finite_toml_values_rejected() {
        let config: Config = toml::from_str(
            "[crawler]\nseed = \"https://example.com/\"\n[http]\nbackoff-factor = nan\n",
        )
        .unwrap();
        assert!(config.http.backoff_factor.is_nan());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_auth_pattern() {
        let mut config = valid_config();
        config.safety.auth_patterns.push("/(unclosed".to_string());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_crawler_name_characters() {
        let mut config = valid_config();
        config.user_agent.crawler_name = "Bad Name".to_string();
        assert!(validate(&config).is_err());

        // A full header override skips the name check
        config.user_agent.header = Some("Bad Name/1.0".to_string());
        assert!(validate(&config).is_ok());
    }
}

use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Legal Spider
///
/// Every section is optional in the TOML file; missing keys take the defaults
/// below, so a config that only names a seed is a complete config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub http: HttpConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limit: RateLimitConfig,
    pub policy: PolicyConfig,
    pub safety: SafetyConfig,
    pub output: OutputConfig,
}

/// Crawl extent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Seed address the crawl starts from
    pub seed: String,

    /// Maximum number of pages admitted to the network
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Maximum link depth from the seed (seed is depth 0)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Size of the worker pool
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Hard cap on pending frontier items (defaults to max-pages * 2)
    #[serde(rename = "frontier-capacity")]
    pub frontier_capacity: Option<usize>,
}

impl CrawlerConfig {
    pub fn frontier_capacity(&self) -> usize {
        self.frontier_capacity
            .unwrap_or(self.max_pages as usize * 2)
            .max(1)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed: String::new(),
            max_pages: 100,
            max_depth: 2,
            max_concurrent_requests: 1,
            frontier_capacity: None,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Full header value; replaces the composed one when set
    pub header: Option<String>,
}

impl UserAgentConfig {
    /// Returns the `User-Agent` header value, `Name/Version (+contact-url)`
    pub fn header_value(&self) -> String {
        match &self.header {
            Some(header) => header.clone(),
            None => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, self.contact_url
            ),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "LegalSpider".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://github.com/legal-spider/info".to_string(),
            header: None,
        }
    }
}

/// Page fetching and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connect timeout in seconds
    #[serde(rename = "timeout-connect")]
    pub timeout_connect: f64,

    /// Read timeout in seconds for the first attempt
    #[serde(rename = "timeout-read")]
    pub timeout_read: f64,

    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds
    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,

    /// Growth of the read timeout per attempt, between 1.0 and 2.0
    #[serde(rename = "timeout-multiplier")]
    pub timeout_multiplier: f64,

    /// Fixed delay before the single retry of a non-timeout network error
    #[serde(rename = "network-retry-delay")]
    pub network_retry_delay: f64,

    /// Bodies beyond this size are truncated
    #[serde(rename = "max-content-bytes")]
    pub max_content_bytes: usize,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        seconds(self.timeout_connect, MAX_CONNECT_TIMEOUT_SECS)
    }

    pub fn read_timeout(&self) -> Duration {
        seconds(self.timeout_read, MAX_READ_TIMEOUT_SECS)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_connect: 5.0,
            timeout_read: 30.0,
            max_retries: 3,
            backoff_factor: 2.0,
            timeout_multiplier: 1.5,
            network_retry_delay: 1.0,
            max_content_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Per-domain token bucket configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    #[serde(rename = "requests-per-second")]
    pub requests_per_second: f64,

    /// Bucket capacity; 1 means strict spacing between requests
    #[serde(rename = "burst-capacity")]
    pub burst_capacity: u32,

    /// Concurrent requests allowed per domain; 0 disables the cap
    #[serde(rename = "max-in-flight-per-domain")]
    pub max_in_flight_per_domain: u32,

    /// Longest robots.txt crawl delay honored, in seconds
    #[serde(rename = "max-crawl-delay")]
    pub max_crawl_delay: f64,
}

impl RateLimitConfig {
    pub fn max_crawl_delay(&self) -> Duration {
        seconds(self.max_crawl_delay, MAX_CRAWL_DELAY_SECS)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst_capacity: 1,
            max_in_flight_per_domain: 1,
            max_crawl_delay: 60.0,
        }
    }
}

/// robots.txt handling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,

    #[serde(rename = "cache-ttl-hours")]
    pub cache_ttl_hours: u32,

    /// Timeout for fetching robots.txt, in seconds
    #[serde(rename = "fetch-timeout")]
    pub fetch_timeout: f64,

    /// Maximum robots.txt size read
    #[serde(rename = "max-bytes")]
    pub max_bytes: usize,

    /// Whether Allow beats Disallow when both match with equal length
    #[serde(rename = "allow-wins-ties")]
    pub allow_wins_ties: bool,
}

impl PolicyConfig {
    pub fn fetch_timeout(&self) -> Duration {
        seconds(self.fetch_timeout, MAX_POLICY_FETCH_TIMEOUT_SECS)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            respect_robots: true,
            cache_ttl_hours: 24,
            fetch_timeout: 5.0,
            max_bytes: 500 * 1024,
            allow_wins_ties: true,
        }
    }
}

/// Safety gate configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    #[serde(rename = "avoid-auth-pages")]
    pub avoid_auth_pages: bool,

    #[serde(rename = "avoid-forms")]
    pub avoid_forms: bool,

    #[serde(rename = "max-url-length")]
    pub max_url_length: usize,

    /// File extensions never fetched (with leading dot)
    #[serde(rename = "excluded-extensions")]
    pub excluded_extensions: Vec<String>,

    /// Path fragments never fetched, matched as substrings
    #[serde(rename = "excluded-paths")]
    pub excluded_paths: Vec<String>,

    /// Case-insensitive regexes for authentication and admin paths
    #[serde(rename = "auth-patterns")]
    pub auth_patterns: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            avoid_auth_pages: true,
            avoid_forms: true,
            max_url_length: 2048,
            excluded_extensions: to_strings(DEFAULT_EXCLUDED_EXTENSIONS),
            excluded_paths: to_strings(DEFAULT_EXCLUDED_PATHS),
            auth_patterns: to_strings(DEFAULT_AUTH_PATTERNS),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the JSON report is written, if anywhere
    #[serde(rename = "results-path")]
    pub results_path: Option<String>,
}

// Upper bounds enforced by validation
pub const MAX_CONNECT_TIMEOUT_SECS: f64 = 60.0;
pub const MAX_READ_TIMEOUT_SECS: f64 = 300.0;
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;
pub const MAX_NETWORK_RETRY_DELAY_SECS: f64 = 60.0;
pub const MAX_POLICY_FETCH_TIMEOUT_SECS: f64 = 5.0;
pub const MAX_CRAWL_DELAY_SECS: f64 = 3600.0;

/// Converts a seconds value, falling back to `limit` for values that cannot be
/// represented (NaN, infinite, negative or out of range)
fn seconds(value: f64, limit: f64) -> Duration {
    let limit = Duration::from_secs_f64(limit);
    Duration::try_from_secs_f64(value).map_or(limit, |duration| duration.min(limit))
}

pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".rar", ".tar", ".gz", ".exe", ".dmg", ".iso", ".jpg", ".jpeg", ".png",
    ".gif", ".bmp", ".svg", ".ico", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".doc",
    ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
];

pub const DEFAULT_EXCLUDED_PATHS: &[&str] = &[
    "/admin/",
    "/administrator/",
    "/webadmin/",
    "/siteadmin/",
    "/cpanel/",
    "/phpmyadmin/",
    "/wp-admin/",
    "/login/",
    "/auth/",
    "/authentication/",
    "/signin/",
    "/signup/",
    "/register/",
    "/account/",
    "/user/",
    "/member/",
    "/logout/",
    "/logoff/",
    "/delete/",
    "/remove/",
    "/api/",
    "/webhook/",
    "/callback/",
];

pub const DEFAULT_AUTH_PATTERNS: &[&str] = &[
    r"/log(in|on|out|off)\b",
    r"/sign(in|out|up)\b",
    r"/auth(entication|orize)?\b",
    r"/sessions?\b",
    r"/register\b",
    r"/(web|site)?admin(istrator)?\b",
    r"/cpanel\b",
    r"/phpmyadmin\b",
    r"/wp-(admin|login)\b",
    r"/manage\b",
    r"/control\b",
    r"/dashboard\b",
];

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

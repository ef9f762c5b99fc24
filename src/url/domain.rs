use url::Url;

/// Extracts the domain key from a URL
///
/// The key is the lowercase host, followed by `:port` when the URL carries a
/// non-default port. It is the unit of rate limiting and robots.txt scoping,
/// so two servers on the same host but different ports are treated as
/// different domains.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use legal_spider::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(extract_domain(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns true when both URLs belong to the same domain key
pub fn is_same_domain(a: &Url, b: &Url) -> bool {
    match (extract_domain(a), extract_domain(b)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Builds the robots.txt location for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    url.join("/robots.txt").ok()
}

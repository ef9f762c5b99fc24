//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use legal_spider::config::Config;
use legal_spider::crawler::{crawl, Coordinator};
use legal_spider::output::StatusClass;
use legal_spider::state::PageState;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration seeded at the mock server root
fn create_test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.crawler.seed = format!("{}/", base_url);
    config.crawler.max_depth = 2;
    config.rate_limit.requests_per_second = 10.0;
    config.http.timeout_read = 5.0;
    config.http.backoff_factor = 0.01;
    config.http.network_retry_delay = 0.01;
    config
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, page: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_skips_login_and_other_domains() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(
        &mock_server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"),
    )
    .await;
    mount_page(
        &mock_server,
        "/",
        r#"<a href="/b">B</a> <a href="/login">Sign in</a> <a href="https://other.example/x">X</a>"#,
    )
    .await;
    mount_page(&mock_server, "/b", "<p>leaf</p>").await;

    // The login page must never be requested
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(html("login"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let report = crawl(create_test_config(&base_url)).await.unwrap();

    assert_eq!(report.stats.pages_crawled, 2);
    assert_eq!(report.stats.pages_skipped, 1);
    assert_eq!(report.stats.errors_encountered, 0);

    let crawled: Vec<String> = report.crawled.iter().map(|u| u.to_string()).collect();
    assert_eq!(crawled, vec![format!("{}/", base_url), format!("{}/b", base_url)]);

    let login = report.result_for(&format!("{}/login", base_url)).unwrap();
    assert_eq!(login.status_class, StatusClass::SafetySkipped);
    assert_eq!(login.page_state(), PageState::Skipped);

    let root = report.result_for(&format!("{}/", base_url)).unwrap();
    assert_eq!(root.title.as_deref(), Some("Test"));
    assert!(root
        .links
        .iter()
        .all(|link| link.as_str().starts_with(&base_url)));

    // Every request carried the crawler's identity
    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests.iter().all(|request| {
        request
            .headers
            .get("user-agent")
            .and_then(|value| value.to_str().ok())
            .map_or(false, |ua| ua.starts_with("LegalSpider/1.0"))
    }));
}

#[tokio::test]
async fn test_zero_depth_crawls_only_seed() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", r#"<a href="/b">B</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("b"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&base_url);
    config.crawler.max_depth = 0;
    let report = crawl(config).await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.stats.pages_crawled, 1);
    assert_eq!(
        report.results[0].links[0].as_str(),
        format!("{}/b", base_url)
    );
}

#[tokio::test]
async fn test_robots_server_error_fails_open() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(&mock_server, ResponseTemplate::new(500)).await;
    mount_page(&mock_server, "/", r#"<a href="/b">B</a>"#).await;
    mount_page(&mock_server, "/b", "leaf").await;

    let report = crawl(create_test_config(&base_url)).await.unwrap();

    assert_eq!(report.stats.pages_crawled, 2);
    assert_eq!(report.policy.fetch_failures, 1);
}

#[tokio::test]
async fn test_robots_disallow_is_honored() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(
        &mock_server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount_page(
        &mock_server,
        "/",
        r#"<a href="/private/report">P</a> <a href="/public">Q</a>"#,
    )
    .await;
    mount_page(&mock_server, "/public", "ok").await;
    Mock::given(method("GET"))
        .and(path("/private/report"))
        .respond_with(html("secret"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let report = crawl(create_test_config(&base_url)).await.unwrap();

    let private = report
        .result_for(&format!("{}/private/report", base_url))
        .unwrap();
    assert_eq!(private.status_class, StatusClass::PolicyDisallowed);
    assert_eq!(report.stats.pages_crawled, 2);
    assert_eq!(report.stats.pages_skipped, 1);

    // robots.txt is fetched once per domain
    let robots_fetches = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/robots.txt")
        .count();
    assert_eq!(robots_fetches, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried_then_recorded() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", r#"<a href="/flaky">F</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&base_url);
    config.http.max_retries = 2;
    let report = crawl(config).await.unwrap();

    let flaky = report.result_for(&format!("{}/flaky", base_url)).unwrap();
    assert_eq!(flaky.status_class, StatusClass::ServerError);
    assert_eq!(flaky.http_status, Some(503));
    assert_eq!(flaky.attempts, 3);
    assert_eq!(report.stats.errors_encountered, 1);
    assert_eq!(report.http.retries_performed, 2);
}

#[tokio::test]
async fn test_requests_are_spaced_by_rate_limit() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", r#"<a href="/a">A</a> <a href="/b">B</a>"#).await;
    mount_page(&mock_server, "/a", "a").await;
    mount_page(&mock_server, "/b", "b").await;

    let mut config = create_test_config(&base_url);
    config.rate_limit.requests_per_second = 5.0;
    config.crawler.max_concurrent_requests = 3;

    let started = Instant::now();
    let report = crawl(config).await.unwrap();

    // Three pages at 5 req/s with a single token: two full intervals
    assert_eq!(report.stats.pages_crawled, 3);
    assert!(started.elapsed() >= Duration::from_millis(380));
}

#[tokio::test]
async fn test_crawl_delay_slows_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_robots(
        &mock_server,
        ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1\n"),
    )
    .await;
    mount_page(&mock_server, "/", r#"<a href="/a">A</a>"#).await;
    mount_page(&mock_server, "/a", "a").await;

    let started = Instant::now();
    let report = crawl(create_test_config(&base_url)).await.unwrap();

    assert_eq!(report.stats.pages_crawled, 2);
    assert!(started.elapsed() >= Duration::from_millis(950));
}

#[tokio::test]
async fn test_page_budget_limits_requests() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<a href="/a">A</a> <a href="/b">B</a> <a href="/c">C</a>"#,
    )
    .await;
    for page in ["/a", "/b", "/c"] {
        mount_page(&mock_server, page, "leaf").await;
    }

    let mut config = create_test_config(&base_url);
    config.crawler.max_pages = 2;
    let report = crawl(config).await.unwrap();

    assert_eq!(report.stats.pages_crawled, 2);
    let page_requests = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() != "/robots.txt")
        .count();
    assert_eq!(page_requests, 2);
}

#[tokio::test]
async fn test_report_written_with_config_hash() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_page(&mock_server, "/", "<p>only page</p>").await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("results.json");

    let report = Coordinator::new(create_test_config(&base_url))
        .unwrap()
        .with_config_hash("deadbeef".to_string())
        .run(CancellationToken::new())
        .await
        .unwrap();
    report.write_json(&output).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["config_hash"], "deadbeef");
    assert_eq!(json["stats"]["pages_crawled"], 1);
    assert_eq!(json["results"][0]["status_class"], "success");
    assert!(json["results"][0]["content_size"].as_u64().unwrap() > 0);
    assert_eq!(json["frontier"]["visited_count"], 1);
    assert_eq!(json["frontier"]["queue_size"], 0);
    assert_eq!(json["interrupted"], false);
}

//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the components together:
//! - Seeding the frontier
//! - Running a pool of workers that pop, gate, fetch and expand addresses
//! - Tracking per-address lifecycle state and the page budget
//! - Handling cancellation and termination
//! - Assembling the final report
//!
//! Every component is reached through a trait object, so tests can swap any
//! of them for a double via [`Coordinator::with_components`].

use crate::config::{validate, Config};
use crate::crawler::fetcher::{build_http_client, FetchOutcome, Fetcher, HttpFetcher};
use crate::crawler::frontier::{Frontier, FrontierItem, FrontierPoll, FrontierStats};
use crate::crawler::parser::{HtmlLinkExtractor, LinkExtractor};
use crate::crawler::rate_limiter::{DomainRateLimiter, RateLimiter};
use crate::crawler::retry::{FetchExecutor, RetryPolicy};
use crate::output::{CrawlReport, CrawlResult, CrawlStats, StatusClass};
use crate::robots::{CrawlPolicy, PolicyCache, PolicySettings, PolicyStats};
use crate::safety::{PatternSafetyGate, SafetyGate, SafetyVerdict};
use crate::state::PageState;
use crate::url::{extract_domain, is_same_domain, normalize_parsed, normalize_url};
use crate::{Result, SpiderError};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// How long an idle worker sleeps before re-checking the frontier
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Log progress every this many finished pages
const PROGRESS_INTERVAL: u64 = 10;

/// Collaborators used by a crawl run
pub struct Components {
    /// robots.txt policy; `None` disables robots checks and crawl delays
    pub policy: Option<Arc<dyn CrawlPolicy>>,
    pub limiter: Arc<dyn RateLimiter>,
    pub safety: Arc<dyn SafetyGate>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn LinkExtractor>,
}

impl Components {
    /// Wires the default implementations from configuration
    ///
    /// The policy cache and the page fetcher share one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(config)?;
        let user_agent = config.user_agent.header_value();

        let policy: Option<Arc<dyn CrawlPolicy>> = if config.policy.respect_robots {
            Some(Arc::new(PolicyCache::new(
                client.clone(),
                &user_agent,
                PolicySettings::from(&config.policy),
            )))
        } else {
            tracing::warn!("robots.txt checks are disabled");
            None
        };

        Ok(Self {
            limiter: Arc::new(DomainRateLimiter::new(
                config.rate_limit.clone(),
                policy.clone(),
            )),
            policy,
            safety: Arc::new(PatternSafetyGate::new(&config.safety)?),
            fetcher: Arc::new(HttpFetcher::new(client, config)),
            extractor: Arc::new(HtmlLinkExtractor),
        })
    }
}

/// State shared by the workers of one run
struct RunContext {
    config: Config,
    seed: Url,
    user_agent: String,
    frontier: Frontier,
    policy: Option<Arc<dyn CrawlPolicy>>,
    safety: Arc<dyn SafetyGate>,
    executor: FetchExecutor,
    extractor: Arc<dyn LinkExtractor>,

    /// Pages admitted to the network so far
    reserved: AtomicU32,
    /// Items dropped because the page budget was spent
    discarded: AtomicU64,
    finished: AtomicU64,

    page_states: Mutex<HashMap<String, PageState>>,
    results: Mutex<Vec<CrawlResult>>,
    crawled: Mutex<Vec<Url>>,
    started: Instant,
    wake: Notify,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    context: Arc<RunContext>,
    config_hash: Option<String>,
}

impl Coordinator {
    /// Creates a coordinator with the default components
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an unusable seed, a bad safety
    /// pattern, or if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let components = Components::from_config(&config)?;
        Self::with_components(config, components)
    }

    /// Creates a coordinator around the given components
    pub fn with_components(config: Config, components: Components) -> Result<Self> {
        validate(&config)?;
        let seed = normalize_url(&config.crawler.seed)?;

        let executor = FetchExecutor::new(
            components.fetcher,
            components.limiter,
            RetryPolicy::from(&config.http),
        );

        let context = RunContext {
            user_agent: config.user_agent.header_value(),
            frontier: Frontier::new(config.crawler.max_depth, config.crawler.frontier_capacity()),
            policy: components.policy,
            safety: components.safety,
            executor,
            extractor: components.extractor,
            reserved: AtomicU32::new(0),
            discarded: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            page_states: Mutex::new(HashMap::new()),
            results: Mutex::new(Vec::new()),
            crawled: Mutex::new(Vec::new()),
            started: Instant::now(),
            wake: Notify::new(),
            seed,
            config,
        };

        Ok(Self {
            context: Arc::new(context),
            config_hash: None,
        })
    }

    /// Records the configuration file digest in the report
    pub fn with_config_hash(mut self, hash: String) -> Self {
        self.config_hash = Some(hash);
        self
    }

    /// Runs the crawl until the frontier is exhausted, the page budget is
    /// spent, or `cancel` fires
    ///
    /// Cancellation lets in-flight fetches finish, admits nothing new, and
    /// returns the partial report with `interrupted` set.
    pub async fn run(self, cancel: CancellationToken) -> Result<CrawlReport> {
        let context = self.context;
        let started_at = Utc::now();
        let workers = context.config.crawler.max_concurrent_requests.max(1) as usize;

        tracing::info!(
            "Starting crawl of {} (max {} pages, depth {}, {} workers)",
            context.seed,
            context.config.crawler.max_pages,
            context.config.crawler.max_depth,
            workers
        );

        context.enqueue(context.seed.clone(), 0, None);

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let context = Arc::clone(&context);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { context.work(id, cancel).await }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| SpiderError::Worker(e.to_string()))?;
        }

        let interrupted = cancel.is_cancelled();
        let frontier = context.frontier.stats();
        let leftover = context.frontier.drain_pending();
        if !leftover.is_empty() {
            tracing::info!("{} queued addresses were not crawled", leftover.len());
        }

        let report = context.report(started_at, self.config_hash, interrupted, frontier);
        tracing::info!(
            "Crawl finished: {} crawled, {} skipped, {} errors in {:.1}s",
            report.stats.pages_crawled,
            report.stats.pages_skipped,
            report.stats.errors_encountered,
            report.stats.duration_seconds
        );
        Ok(report)
    }
}

impl RunContext {
    async fn work(&self, id: usize, cancel: CancellationToken) {
        tracing::debug!("Worker {} started", id);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.frontier.next_or_idle() {
                FrontierPoll::Ready(item) => {
                    self.process(item, &cancel).await;
                    self.wake.notify_waiters();
                }
                FrontierPoll::Busy => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
                FrontierPoll::Idle => {
                    // Nothing queued and nobody left to discover more
                    self.wake.notify_waiters();
                    break;
                }
            }
        }

        tracing::debug!("Worker {} stopped", id);
    }

    /// Takes one item from `Queued` to a terminal state
    async fn process(&self, item: FrontierItem, cancel: &CancellationToken) {
        let FrontierItem {
            address,
            depth,
            parent,
            ..
        } = item;

        if self.budget_spent() {
            self.discard(&address);
            return;
        }

        if let SafetyVerdict::Reject(reason) = self.safety.pre_fetch_check(&address) {
            let result = CrawlResult::skipped(
                address,
                StatusClass::SafetySkipped,
                depth,
                parent,
                reason.to_string(),
            );
            self.finish(result);
            return;
        }

        if let Some(policy) = &self.policy {
            if !policy.is_allowed(&address, &self.user_agent).await {
                let result = CrawlResult::skipped(
                    address,
                    StatusClass::PolicyDisallowed,
                    depth,
                    parent,
                    "disallowed by robots.txt".to_string(),
                );
                self.finish(result);
                return;
            }
        }

        if !self.reserve_page() {
            self.discard(&address);
            return;
        }
        self.transition(&address, PageState::Admitted);

        let domain = extract_domain(&address).unwrap_or_default();
        self.transition(&address, PageState::Fetching);

        let started = Instant::now();
        let execution = self.executor.execute(&address, &domain, cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut result = CrawlResult {
            status_class: StatusClass::from_outcome(&execution.outcome),
            http_status: execution.outcome.status(),
            links: Vec::new(),
            fetched_at: Utc::now(),
            depth,
            parent,
            title: None,
            content_type: None,
            content_size: 0,
            form_types: Vec::new(),
            attempts: execution.attempts,
            elapsed_ms,
            reason: None,
            address,
        };

        match &execution.outcome {
            FetchOutcome::Response {
                status,
                final_url,
                content_type,
                body,
                ..
            } => {
                result.content_type = content_type.clone();
                result.content_size = body.len() as u64;
                if result.status_class == StatusClass::Success {
                    if execution.outcome.is_html() {
                        self.expand(&mut result, final_url, body);
                    }
                } else {
                    result.reason = Some(format!("HTTP {}", status));
                }
            }
            FetchOutcome::Error(e) => result.reason = Some(e.to_string()),
        }

        self.finish(result);
    }

    /// Post-fetch check, link extraction and enqueueing for an HTML page
    fn expand(&self, result: &mut CrawlResult, final_url: &Url, body: &[u8]) {
        let html = String::from_utf8_lossy(body);
        let verdict = self.safety.post_fetch_check(&html, &result.address);
        result.form_types = self.safety.detect_forms(&html);

        let page = self.extractor.parse_page(body, final_url);
        result.title = page.title;
        result.links = self.internal_links(page.links);

        match verdict {
            SafetyVerdict::Allow => {
                let mut queued = 0;
                for link in &result.links {
                    if self.enqueue(link.clone(), result.depth + 1, Some(result.address.clone())) {
                        queued += 1;
                    }
                }
                tracing::debug!(
                    "{}: {} internal links, {} queued",
                    result.address,
                    result.links.len(),
                    queued
                );
            }
            SafetyVerdict::Reject(reason) => {
                result.status_class = StatusClass::SafetySkipped;
                result.reason = Some(reason.to_string());
            }
        }
    }

    /// Normalizes links and keeps unique ones on the seed's domain
    fn internal_links(&self, links: Vec<Url>) -> Vec<Url> {
        let mut seen = HashSet::new();
        links
            .into_iter()
            .filter_map(|link| normalize_parsed(link).ok())
            .filter(|link| is_same_domain(link, &self.seed))
            .filter(|link| seen.insert(link.as_str().to_string()))
            .collect()
    }

    /// Offers an address to the frontier; priority equals depth
    fn enqueue(&self, address: Url, depth: u32, parent: Option<Url>) -> bool {
        let key = address.as_str().to_string();
        let outcome = self.frontier.add(address, depth, depth, parent);
        if outcome.enqueued() {
            self.transition_key(&key, PageState::Discovered);
            self.transition_key(&key, PageState::Queued);
        }
        outcome.enqueued()
    }

    fn budget_spent(&self) -> bool {
        self.reserved.load(Ordering::SeqCst) >= self.config.crawler.max_pages
    }

    /// Claims one page of the budget; false if none is left
    fn reserve_page(&self) -> bool {
        let max_pages = self.config.crawler.max_pages;
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |reserved| {
                (reserved < max_pages).then_some(reserved + 1)
            })
            .is_ok()
    }

    fn discard(&self, address: &Url) {
        tracing::debug!("Page budget spent, dropping {}", address);
        self.transition(address, PageState::Skipped);
        self.frontier.mark_visited(address);
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, result: CrawlResult) {
        let state = result.page_state();
        self.transition(&result.address, state);
        self.frontier.mark_visited(&result.address);

        match state {
            PageState::Succeeded => {
                tracing::info!("Crawled {} ({} links)", result.address, result.links.len());
                lock(&self.crawled).push(result.address.clone());
            }
            PageState::Skipped => {
                tracing::info!("Skipped {}: {}", result.address, result.status_class);
            }
            _ => tracing::warn!(
                "Failed {}: {}",
                result.address,
                result.reason.as_deref().unwrap_or("unknown error")
            ),
        }

        lock(&self.results).push(result);

        let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % PROGRESS_INTERVAL == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} pages finished, {} in frontier, {:.2} pages/sec",
                finished,
                self.frontier.pending_len(),
                finished as f64 / elapsed.max(f64::EPSILON)
            );
        }
    }

    fn transition(&self, address: &Url, next: PageState) {
        self.transition_key(address.as_str(), next);
    }

    fn transition_key(&self, key: &str, next: PageState) {
        let mut states = lock(&self.page_states);
        match states.get(key).copied() {
            None if next == PageState::Discovered => {}
            None => tracing::warn!("{} entered {} without being discovered", key, next),
            Some(current) if !current.can_transition_to(next) => {
                tracing::warn!("Unexpected transition {} -> {} for {}", current, next, key);
            }
            Some(_) => {}
        }
        states.insert(key.to_string(), next);
    }

    fn report(
        &self,
        started_at: chrono::DateTime<Utc>,
        config_hash: Option<String>,
        interrupted: bool,
        frontier: FrontierStats,
    ) -> CrawlReport {
        let duration_seconds = self.started.elapsed().as_secs_f64();
        let results = std::mem::take(&mut *lock(&self.results));
        let crawled = std::mem::take(&mut *lock(&self.crawled));
        let page_states: BTreeMap<String, PageState> = lock(&self.page_states)
            .iter()
            .filter(|(_, state)| state.is_terminal())
            .map(|(address, state)| (address.clone(), *state))
            .collect();

        let mut stats = CrawlStats::from_results(&results, duration_seconds);
        stats.pages_skipped += self.discarded.load(Ordering::Relaxed);

        let http = self.executor.stats();
        let avg_response_ms = if http.requests_made > 0 {
            http.total_response_ms as f64 / http.requests_made as f64
        } else {
            0.0
        };
        let pages_per_second = if duration_seconds > 0.0 {
            stats.pages_crawled as f64 / duration_seconds
        } else {
            0.0
        };

        CrawlReport {
            seed: self.seed.clone(),
            started_at,
            finished_at: Utc::now(),
            config_hash,
            stats,
            pages_per_second,
            avg_response_ms,
            http,
            safety: self.safety.stats(),
            policy: self
                .policy
                .as_ref()
                .map(|policy| policy.stats())
                .unwrap_or_else(PolicyStats::default),
            frontier,
            interrupted,
            crawled,
            page_states,
            results,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::FetchError;
    use crate::crawler::rate_limiter::Admission;
    use crate::safety::{FormKind, SafetyRejection};
    use async_trait::async_trait;

    /// Serves canned pages keyed by path; unknown paths are 404
    struct SiteFetcher {
        pages: HashMap<String, (u16, &'static str, String)>,
        requests: Mutex<Vec<String>>,
    }

    impl SiteFetcher {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn page(mut self, path: &str, html: &str) -> Self {
            self.pages
                .insert(path.to_string(), (200, "text/html", html.to_string()));
            self
        }

        fn raw(mut self, path: &str, status: u16, content_type: &'static str) -> Self {
            self.pages
                .insert(path.to_string(), (status, content_type, String::new()));
            self
        }

        fn requested(&self) -> Vec<String> {
            lock(&self.requests).clone()
        }
    }

    #[async_trait]
    impl Fetcher for SiteFetcher {
        async fn fetch(&self, address: &Url, _attempt: u32) -> FetchOutcome {
            lock(&self.requests).push(address.path().to_string());
            match self.pages.get(address.path()) {
                Some((status, content_type, body)) => FetchOutcome::Response {
                    status: *status,
                    final_url: address.clone(),
                    content_type: Some(content_type.to_string()),
                    body: body.clone().into_bytes(),
                    retry_after: None,
                },
                None if address.path() == "/down" => {
                    FetchOutcome::Error(FetchError::Connect("refused".to_string()))
                }
                None => FetchOutcome::Response {
                    status: 404,
                    final_url: address.clone(),
                    content_type: None,
                    body: Vec::new(),
                    retry_after: None,
                },
            }
        }
    }

    /// Serves one page per request, but only after `release` is signalled
    struct GatedFetcher {
        html: &'static str,
        started: Notify,
        release: Notify,
        requests: Mutex<Vec<String>>,
    }

    impl GatedFetcher {
        fn new(html: &'static str) -> Self {
            Self {
                html,
                started: Notify::new(),
                release: Notify::new(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for GatedFetcher {
        async fn fetch(&self, address: &Url, _attempt: u32) -> FetchOutcome {
            lock(&self.requests).push(address.path().to_string());
            self.started.notify_one();
            self.release.notified().await;
            FetchOutcome::Response {
                status: 200,
                final_url: address.clone(),
                content_type: Some("text/html".to_string()),
                body: self.html.as_bytes().to_vec(),
                retry_after: None,
            }
        }
    }

    struct OpenLimiter;

    #[async_trait]
    impl RateLimiter for OpenLimiter {
        async fn acquire(&self, _domain: &str) -> Admission {
            Admission::immediate()
        }
    }

    /// Disallows any path starting with one of the prefixes
    struct DenyPrefixes(Vec<&'static str>);

    #[async_trait]
    impl CrawlPolicy for DenyPrefixes {
        async fn is_allowed(&self, address: &Url, _user_agent: &str) -> bool {
            !self.0.iter().any(|prefix| address.path().starts_with(prefix))
        }

        fn crawl_delay(&self, _domain: &str) -> Option<f64> {
            None
        }
    }

    fn config(max_pages: u32, max_depth: u32) -> Config {
        let mut config = Config::default();
        config.crawler.seed = "https://example.test/".to_string();
        config.crawler.max_pages = max_pages;
        config.crawler.max_depth = max_depth;
        config.http.max_retries = 1;
        config.http.network_retry_delay = 0.01;
        config
    }

    fn coordinator(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        policy: Option<Arc<dyn CrawlPolicy>>,
    ) -> Coordinator {
        let components = Components {
            policy,
            limiter: Arc::new(OpenLimiter),
            safety: Arc::new(PatternSafetyGate::new(&config.safety).unwrap()),
            fetcher,
            extractor: Arc::new(HtmlLinkExtractor),
        };
        Coordinator::with_components(config, components).unwrap()
    }

    fn url(path: &str) -> String {
        format!("https://example.test{}", path)
    }

    #[tokio::test]
    async fn test_login_skipped_and_external_excluded() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page(
                    "/",
                    r#"<a href="/b">b</a><a href="/login">in</a><a href="https://other.test/x">x</a>"#,
                )
                .page("/b", "<p>leaf</p>"),
        );
        let report = coordinator(config(100, 2), fetcher.clone(), None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let crawled: Vec<&str> = report.crawled.iter().map(Url::as_str).collect();
        assert_eq!(crawled, vec![url("/"), url("/b")]);
        assert_eq!(report.stats.pages_crawled, 2);
        assert_eq!(report.stats.pages_skipped, 1);
        assert_eq!(report.stats.errors_encountered, 0);

        // The login page never reached the network
        assert!(!fetcher.requested().contains(&"/login".to_string()));
        assert_eq!(report.page_states[&url("/login")], PageState::Skipped);

        let root = report.result_for(&url("/")).unwrap();
        let links: Vec<&str> = root.links.iter().map(Url::as_str).collect();
        assert_eq!(links, vec![url("/b"), url("/login")]);
    }

    #[tokio::test]
    async fn test_zero_depth_fetches_only_seed() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page("/", r#"<a href="/b">b</a>"#)
                .page("/b", "<p>b</p>"),
        );
        let report = coordinator(config(100, 0), fetcher.clone(), None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fetcher.requested(), vec!["/"]);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].links[0].as_str(), url("/b"));
        assert!(!report.page_states.contains_key(&url("/b")));
    }

    #[tokio::test]
    async fn test_page_budget_bounds_fetches() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page(
                    "/",
                    r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a><a href="/d">d</a>"#,
                )
                .page("/a", "a")
                .page("/b", "b")
                .page("/c", "c")
                .page("/d", "d"),
        );
        let mut config = config(3, 2);
        config.crawler.max_concurrent_requests = 4;
        let report = coordinator(config, fetcher.clone(), None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fetcher.requested().len(), 3);
        assert_eq!(report.stats.pages_crawled + report.stats.errors_encountered, 3);
        assert_eq!(report.stats.pages_skipped, 2);
    }

    #[tokio::test]
    async fn test_duplicate_links_fetched_once() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page(
                    "/",
                    r#"<a href="/a">1</a><a href="/a#top">2</a><a href="/a/">3</a><a href="/?utm_source=x">self</a>"#,
                )
                .page("/a", r#"<a href="/">home</a><a href="/a">self</a>"#),
        );
        let mut config = config(100, 3);
        config.crawler.max_concurrent_requests = 3;
        coordinator(config, fetcher.clone(), None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let mut requested = fetcher.requested();
        requested.sort();
        assert_eq!(requested, vec!["/", "/a"]);
    }

    #[tokio::test]
    async fn test_robots_disallow_is_skip() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page("/", r#"<a href="/private/x">p</a><a href="/public">q</a>"#)
                .page("/public", "ok"),
        );
        let policy: Arc<dyn CrawlPolicy> = Arc::new(DenyPrefixes(vec!["/private"]));
        let report = coordinator(config(100, 2), fetcher.clone(), Some(policy))
            .run(CancellationToken::new())
            .await
            .unwrap();

        let private = report.result_for(&url("/private/x")).unwrap();
        assert_eq!(private.status_class, StatusClass::PolicyDisallowed);
        assert_eq!(private.attempts, 0);
        assert!(!fetcher.requested().contains(&"/private/x".to_string()));
        assert_eq!(report.stats.pages_crawled, 2);
    }

    #[tokio::test]
    async fn test_password_form_page_not_expanded() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page(
                    "/",
                    r#"<form action="/do"><input type="password"></form><a href="/next">n</a>"#,
                )
                .page("/next", "next"),
        );
        let report = coordinator(config(100, 2), fetcher.clone(), None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let root = report.result_for(&url("/")).unwrap();
        assert_eq!(root.status_class, StatusClass::SafetySkipped);
        assert_eq!(root.http_status, Some(200));
        assert_eq!(root.links.len(), 1);
        assert_eq!(fetcher.requested(), vec!["/"]);
        assert_eq!(
            root.reason.as_deref(),
            Some(SafetyRejection::PasswordForm.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page(
                    "/",
                    r#"<a href="/missing">m</a><a href="/down">d</a><a href="/file">f</a>"#,
                )
                .raw("/file", 200, "application/json"),
        );
        let report = coordinator(config(100, 2), fetcher.clone(), None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let missing = report.result_for(&url("/missing")).unwrap();
        assert_eq!(missing.status_class, StatusClass::ClientError);
        assert_eq!(missing.http_status, Some(404));
        assert_eq!(missing.attempts, 1);

        let down = report.result_for(&url("/down")).unwrap();
        assert_eq!(down.status_class, StatusClass::NetworkError);
        assert_eq!(down.attempts, 2);

        let file = report.result_for(&url("/file")).unwrap();
        assert_eq!(file.status_class, StatusClass::Success);
        assert!(file.links.is_empty());

        assert_eq!(report.stats.errors_encountered, 2);
        assert_eq!(report.http.requests_made, 5);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_partial() {
        let fetcher = Arc::new(SiteFetcher::new().page("/", r#"<a href="/b">b</a>"#));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator(config(100, 2), fetcher, None)
            .run(cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_keeps_in_flight_result() {
        let fetcher = Arc::new(GatedFetcher::new(
            r#"<a href="/a">a</a><a href="/b">b</a>"#,
        ));
        let mut config = config(100, 2);
        config.crawler.max_concurrent_requests = 3;
        let cancel = CancellationToken::new();
        let run = tokio::spawn(
            coordinator(config, Arc::clone(&fetcher) as Arc<dyn Fetcher>, None)
                .run(cancel.clone()),
        );

        fetcher.started.notified().await;
        cancel.cancel();
        fetcher.release.notify_one();
        let report = run.await.unwrap().unwrap();

        assert!(report.interrupted);
        assert_eq!(*lock(&fetcher.requests), vec!["/"]);

        let root = report.result_for(&url("/")).unwrap();
        assert_eq!(root.status_class, StatusClass::Success);
        assert_eq!(root.links.len(), 2);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.page_states[&url("/")], PageState::Succeeded);
        assert!(!report.page_states.contains_key(&url("/a")));

        // Children were queued but never handed out
        assert_eq!(report.frontier.queue_size, 2);
        assert_eq!(report.frontier.total_discovered, 3);
    }

    #[tokio::test]
    async fn test_page_size_and_forms_recorded() {
        let html = r#"<form action="/search"><input name="q"></form><a href="/b">b</a>"#;
        let fetcher = Arc::new(SiteFetcher::new().page("/", html).page("/b", "b"));
        let report = coordinator(config(100, 1), fetcher, None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let root = report.result_for(&url("/")).unwrap();
        assert_eq!(root.content_size, html.len() as u64);
        assert_eq!(root.form_types, vec![FormKind::Search]);
        assert_eq!(report.result_for(&url("/b")).unwrap().content_size, 1);
        assert_eq!(report.stats.total_content_size, html.len() as u64 + 1);

        assert_eq!(report.frontier.total_discovered, 2);
        assert_eq!(report.frontier.visited_count, 2);
        assert_eq!(report.frontier.queue_size, 0);
    }

    #[tokio::test]
    async fn test_every_terminal_state_is_final() {
        let fetcher = Arc::new(
            SiteFetcher::new()
                .page("/", r#"<a href="/a">a</a><a href="/admin">x</a>"#)
                .page("/a", "a"),
        );
        let report = coordinator(config(100, 2), fetcher, None)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.page_states.values().all(PageState::is_terminal));
        assert_eq!(report.page_states.len(), report.results.len());
    }

    #[test]
    fn test_invalid_seed_is_rejected() {
        let mut config = config(10, 1);
        config.crawler.seed = "ftp://example.test/".to_string();
        let components = Components::from_config(&config).unwrap();
        assert!(Coordinator::with_components(config, components).is_err());
    }
}

//! Per-run robots.txt cache
//!
//! Entries are keyed by domain. The first caller for an uncached domain fetches
//! robots.txt while later callers for that domain wait on the same per-domain
//! lock and reuse the result. Expired entries keep being served while a single
//! background task refreshes them.

use crate::robots::{fetch_robots, CrawlPolicy, DomainPolicy, PolicySettings, PolicyStats};
use crate::url::extract_domain;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Default)]
struct PolicyCounters {
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    checks: AtomicU64,
    disallowed: AtomicU64,
    stale_served: AtomicU64,
}

/// robots.txt cache shared by all workers of one crawl run
pub struct PolicyCache {
    client: Client,
    user_agent: String,
    settings: PolicySettings,
    entries: Arc<DashMap<String, Arc<DomainPolicy>>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    refreshing: Arc<DashSet<String>>,
    counters: Arc<PolicyCounters>,
}

impl PolicyCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for robots.txt requests
    /// * `user_agent` - Agent whose rules and crawl delay are looked up
    /// * `settings` - TTL, timeout, size limit and tie-break
    pub fn new(client: Client, user_agent: &str, settings: PolicySettings) -> Self {
        Self {
            client,
            user_agent: user_agent.to_string(),
            settings,
            entries: Arc::new(DashMap::new()),
            in_flight: DashMap::new(),
            refreshing: Arc::new(DashSet::new()),
            counters: Arc::new(PolicyCounters::default()),
        }
    }

    /// Returns the cached policy without fetching
    pub fn cached(&self, domain: &str) -> Option<Arc<DomainPolicy>> {
        self.entries.get(domain).map(|entry| Arc::clone(entry.value()))
    }

    /// Inserts a policy directly, replacing any cached entry
    pub fn insert(&self, policy: DomainPolicy) {
        self.entries
            .insert(policy.domain.clone(), Arc::new(policy));
    }

    /// Returns the policy for the domain of `address`, fetching it if needed
    pub async fn policy_for(&self, address: &Url) -> Arc<DomainPolicy> {
        let Some(domain) = extract_domain(address) else {
            return Arc::new(DomainPolicy::unavailable(""));
        };

        if let Some(policy) = self.cached(&domain) {
            if policy.is_stale(self.settings.ttl) {
                self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                self.spawn_refresh(address.clone(), domain);
            }
            return policy;
        }

        let flight = Arc::clone(&self.in_flight.entry(domain.clone()).or_default());
        let _guard = flight.lock().await;

        // Another caller may have completed the fetch while we waited
        if let Some(policy) = self.cached(&domain) {
            return policy;
        }

        let policy = Arc::new(self.fetch(address, &domain).await);
        self.entries.insert(domain, Arc::clone(&policy));
        policy
    }

    async fn fetch(&self, address: &Url, domain: &str) -> DomainPolicy {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        let policy = fetch_robots(&self.client, address, domain, &self.settings).await;
        if !policy.valid {
            self.counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
        }
        policy
    }

    /// Starts one background refresh for a stale domain
    fn spawn_refresh(&self, address: Url, domain: String) {
        if !self.refreshing.insert(domain.clone()) {
            return;
        }

        let client = self.client.clone();
        let settings = self.settings.clone();
        let entries = Arc::clone(&self.entries);
        let refreshing = Arc::clone(&self.refreshing);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            tracing::debug!("Refreshing stale robots.txt for {}", domain);
            counters.fetches.fetch_add(1, Ordering::Relaxed);
            let policy = fetch_robots(&client, &address, &domain, &settings).await;
            if !policy.valid {
                counters.fetch_failures.fetch_add(1, Ordering::Relaxed);
            }
            entries.insert(domain.clone(), Arc::new(policy));
            refreshing.remove(&domain);
        });
    }
}

#[async_trait]
impl CrawlPolicy for PolicyCache {
    async fn is_allowed(&self, address: &Url, user_agent: &str) -> bool {
        let policy = self.policy_for(address).await;
        self.counters.checks.fetch_add(1, Ordering::Relaxed);

        let path = match address.query() {
            Some(query) => format!("{}?{}", address.path(), query),
            None => address.path().to_string(),
        };

        let allowed = policy.is_allowed(&path, user_agent, self.settings.allow_wins_ties);
        if !allowed {
            self.counters.disallowed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("robots.txt disallows {}", address);
        }
        allowed
    }

    fn crawl_delay(&self, domain: &str) -> Option<f64> {
        self.cached(domain)
            .and_then(|policy| policy.crawl_delay(&self.user_agent))
    }

    fn stats(&self) -> PolicyStats {
        PolicyStats {
            domains_cached: self.entries.len() as u64,
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            fetch_failures: self.counters.fetch_failures.load(Ordering::Relaxed),
            checks: self.counters.checks.load(Ordering::Relaxed),
            disallowed: self.counters.disallowed.load(Ordering::Relaxed),
            stale_served: self.counters.stale_served.load(Ordering::Relaxed),
        }
    }
}

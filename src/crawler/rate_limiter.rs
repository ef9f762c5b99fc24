//! Per-domain admission control
//!
//! Each domain gets a token bucket, created on first use and kept for the
//! rest of the run, plus an optional semaphore capping concurrent requests.
//! Buckets are independent; a caller waiting on one domain never blocks
//! another domain.

use crate::config::RateLimitConfig;
use crate::robots::CrawlPolicy;
use crate::state::DomainBucket;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Permission to send one request to a domain
///
/// Holding the admission keeps the domain's in-flight slot; drop it when the
/// request attempt finishes.
#[derive(Debug)]
pub struct Admission {
    /// Time spent waiting for the slot and the token
    pub waited: Duration,
    permit: Option<OwnedSemaphorePermit>,
}

impl Admission {
    /// Admission that waited for nothing and holds no slot
    pub fn immediate() -> Self {
        Self {
            waited: Duration::ZERO,
            permit: None,
        }
    }

    pub fn holds_slot(&self) -> bool {
        self.permit.is_some()
    }
}

/// Admission gate consulted before every request attempt
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Waits until a request to `domain` may be sent
    async fn acquire(&self, domain: &str) -> Admission;
}

/// Token-bucket rate limiter keyed by domain
pub struct DomainRateLimiter {
    config: RateLimitConfig,
    policy: Option<Arc<dyn CrawlPolicy>>,
    buckets: DashMap<String, Arc<Mutex<DomainBucket>>>,
    slots: DashMap<String, Arc<Semaphore>>,
    /// Domains already warned about an excessive crawl delay
    clamped: DashSet<String>,
}

impl DomainRateLimiter {
    /// Creates a limiter
    ///
    /// # Arguments
    ///
    /// * `config` - Default rate and burst for every domain
    /// * `policy` - Source of crawl delays; `None` ignores them
    pub fn new(config: RateLimitConfig, policy: Option<Arc<dyn CrawlPolicy>>) -> Self {
        Self {
            config,
            policy,
            buckets: DashMap::new(),
            slots: DashMap::new(),
            clamped: DashSet::new(),
        }
    }

    /// Crawl delay for `domain`, limited to `max-crawl-delay`
    fn crawl_delay(&self, domain: &str) -> Option<f64> {
        let delay = self.policy.as_ref()?.crawl_delay(domain)?;
        let max = self.config.max_crawl_delay().as_secs_f64();
        if delay.is_finite() && delay <= max {
            return Some(delay);
        }
        if self.clamped.insert(domain.to_string()) {
            tracing::warn!(
                "robots.txt for {} asks for a {}s crawl delay, using {}s",
                domain,
                delay,
                max
            );
        }
        Some(max)
    }

    fn bucket(&self, domain: &str) -> Arc<Mutex<DomainBucket>> {
        let entry = self.buckets.entry(domain.to_string()).or_insert_with(|| {
            tracing::debug!("Creating rate bucket for {}", domain);
            Arc::new(Mutex::new(DomainBucket::new(
                domain,
                self.config.burst_capacity,
                self.config.requests_per_second,
                Instant::now(),
            )))
        });
        Arc::clone(entry.value())
    }

    fn slot(&self, domain: &str) -> Option<Arc<Semaphore>> {
        if self.config.max_in_flight_per_domain == 0 {
            return None;
        }
        let limit = self.config.max_in_flight_per_domain as usize;
        let entry = self
            .slots
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(limit)));
        Some(Arc::clone(entry.value()))
    }

    /// Number of domains seen so far
    pub fn domains(&self) -> usize {
        self.buckets.len()
    }

    /// Tokens granted to a domain so far
    pub async fn granted(&self, domain: &str) -> u64 {
        match self.buckets.get(domain).map(|entry| Arc::clone(entry.value())) {
            Some(bucket) => bucket.lock().await.granted,
            None => 0,
        }
    }
}

#[async_trait]
impl RateLimiter for DomainRateLimiter {
    async fn acquire(&self, domain: &str) -> Admission {
        let started = Instant::now();

        let permit = match self.slot(domain) {
            // The semaphore is never closed
            Some(slot) => slot.acquire_owned().await.ok(),
            None => None,
        };

        let bucket = self.bucket(domain);
        // tokio's Mutex is fair, so waiters are served in arrival order
        let mut bucket = bucket.lock().await;

        let crawl_delay = self.crawl_delay(domain);
        bucket.apply_crawl_delay(crawl_delay, Instant::now());

        while let Some(wait) = bucket.time_until_token(Instant::now()) {
            tracing::trace!("Waiting {:?} for a token on {}", wait, domain);
            tokio::time::sleep(wait).await;
        }
        bucket.try_acquire(Instant::now());

        let waited = started.elapsed();
        if waited > Duration::from_millis(1) {
            tracing::debug!("Admitted request to {} after {:?}", domain, waited);
        }

        Admission { waited, permit }
    }
}

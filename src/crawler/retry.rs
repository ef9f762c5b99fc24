//! Retry classification and the fetch executor
//!
//! | condition | action |
//! |---|---|
//! | 2xx | done |
//! | 429 | wait `Retry-After` (capped at 300 s) or back off, then retry |
//! | 500, 502, 503, 504 | back off with jitter, then retry |
//! | other status | done (terminal) |
//! | timeout | back off, then retry with a longer read timeout |
//! | other network error | one retry after a short fixed delay |
//!
//! Backoff is `backoff_factor ^ attempt + uniform(0, 1)` seconds, with the
//! exponential part capped at [`MAX_BACKOFF`]. No address gets more than
//! `max_retries + 1` attempts.

use crate::config::HttpConfig;
use crate::crawler::fetcher::{FetchError, FetchOutcome, Fetcher};
use crate::crawler::rate_limiter::RateLimiter;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Upper bound on a server-requested `Retry-After` wait
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Upper bound on a computed backoff or fixed retry delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// What to do after an attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Done,
    Retry(Duration),
}

/// Retry classification derived from the `[http]` settings
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub network_retry_delay: Duration,
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            network_retry_delay: capped_seconds(config.network_retry_delay),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after `attempt`, without jitter
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        capped_seconds(self.backoff_factor.powi(attempt as i32))
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        self.base_backoff(attempt) + Duration::from_secs_f64(rand::random::<f64>())
    }

    /// Classifies the outcome of attempt number `attempt` (0-based)
    pub fn decide(&self, outcome: &FetchOutcome, attempt: u32) -> RetryDecision {
        let retries_left = attempt < self.max_retries;

        match outcome {
            FetchOutcome::Response { status, .. } if (200..=299).contains(status) => {
                RetryDecision::Done
            }
            FetchOutcome::Response {
                status: 429,
                retry_after,
                ..
            } if retries_left => {
                let delay = match retry_after {
                    Some(wait) => (*wait).min(MAX_RETRY_AFTER),
                    None => self.backoff_with_jitter(attempt),
                };
                RetryDecision::Retry(delay)
            }
            FetchOutcome::Response {
                status: 500 | 502 | 503 | 504,
                ..
            } if retries_left => RetryDecision::Retry(self.backoff_with_jitter(attempt)),
            FetchOutcome::Response { .. } => RetryDecision::Done,
            FetchOutcome::Error(FetchError::Timeout) if retries_left => {
                RetryDecision::Retry(self.backoff_with_jitter(attempt))
            }
            FetchOutcome::Error(FetchError::Connect(_) | FetchError::Other(_))
                if attempt == 0 && retries_left =>
            {
                RetryDecision::Retry(self.network_retry_delay)
            }
            FetchOutcome::Error(_) => RetryDecision::Done,
        }
    }
}

/// Seconds as a duration no longer than [`MAX_BACKOFF`]; unrepresentable
/// values (NaN, infinite, overflowing) map to the cap
fn capped_seconds(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Final outcome of all attempts for one address
#[derive(Debug)]
pub struct ExecutionReport {
    pub outcome: FetchOutcome,
    pub attempts: u32,
    /// Time spent waiting for admission across attempts
    pub waited: Duration,
    /// Time spent in requests across attempts
    pub response_time: Duration,
}

/// HTTP counters across the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HttpStats {
    pub requests_made: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries_performed: u64,
    pub rate_limited_requests: u64,
    pub bytes_received: u64,
    pub total_response_ms: u64,
}

#[derive(Debug, Default)]
struct HttpCounters {
    requests_made: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    retries_performed: AtomicU64,
    rate_limited_requests: AtomicU64,
    bytes_received: AtomicU64,
    total_response_ms: AtomicU64,
}

/// Runs request attempts for one address until the retry policy says stop
///
/// Every attempt is admitted by the rate limiter first, and the admission is
/// released as soon as the attempt returns.
pub struct FetchExecutor {
    fetcher: Arc<dyn Fetcher>,
    limiter: Arc<dyn RateLimiter>,
    policy: RetryPolicy,
    counters: HttpCounters,
}

impl FetchExecutor {
    pub fn new(fetcher: Arc<dyn Fetcher>, limiter: Arc<dyn RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            limiter,
            policy,
            counters: HttpCounters::default(),
        }
    }

    /// Fetches `address` with retries
    ///
    /// Cancellation stops further retries; the attempt in progress always
    /// completes or times out on its own.
    pub async fn execute(
        &self,
        address: &Url,
        domain: &str,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let mut waited = Duration::ZERO;
        let mut response_time = Duration::ZERO;
        let mut attempt = 0;

        loop {
            let admission = self.limiter.acquire(domain).await;
            waited += admission.waited;

            let started = Instant::now();
            let outcome = self.fetcher.fetch(address, attempt).await;
            let elapsed = started.elapsed();
            drop(admission);

            response_time += elapsed;
            self.record(&outcome, elapsed);

            let decision = self.policy.decide(&outcome, attempt);
            let attempts = attempt + 1;
            let delay = match decision {
                RetryDecision::Done => {
                    self.record_final(&outcome);
                    return ExecutionReport {
                        outcome,
                        attempts,
                        waited,
                        response_time,
                    };
                }
                RetryDecision::Retry(delay) => delay,
            };

            tracing::warn!(
                "{} for {} (attempt {}/{}), retrying in {:.1}s",
                describe(&outcome),
                address,
                attempts,
                self.policy.max_retries + 1,
                delay.as_secs_f64()
            );

            let cancelled = tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                tracing::debug!("Cancelled while waiting to retry {}", address);
                self.record_final(&outcome);
                return ExecutionReport {
                    outcome,
                    attempts,
                    waited,
                    response_time,
                };
            }

            self.counters.retries_performed.fetch_add(1, Ordering::Relaxed);
            attempt += 1;
        }
    }

    fn record(&self, outcome: &FetchOutcome, elapsed: Duration) {
        self.counters.requests_made.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_response_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);

        if let FetchOutcome::Response { status, body, .. } = outcome {
            self.counters
                .bytes_received
                .fetch_add(body.len() as u64, Ordering::Relaxed);
            if *status == 429 {
                self.counters.rate_limited_requests.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_final(&self, outcome: &FetchOutcome) {
        if outcome.is_success() {
            self.counters.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> HttpStats {
        HttpStats {
            requests_made: self.counters.requests_made.load(Ordering::Relaxed),
            successful_requests: self.counters.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.counters.failed_requests.load(Ordering::Relaxed),
            retries_performed: self.counters.retries_performed.load(Ordering::Relaxed),
            rate_limited_requests: self.counters.rate_limited_requests.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            total_response_ms: self.counters.total_response_ms.load(Ordering::Relaxed),
        }
    }
}

fn describe(outcome: &FetchOutcome) -> String {
    match outcome {
        FetchOutcome::Response { status, .. } => format!("HTTP {}", status),
        FetchOutcome::Error(e) => e.to_string(),
    }
}

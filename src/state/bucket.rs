use std::time::Duration;
use tokio::time::Instant;

/// Absorbs float error from lazy refill so a token due "now" is granted
const TOKEN_EPSILON: f64 = 1e-9;

/// Longest spacing a bucket will ever impose between two grants
pub const MAX_TOKEN_INTERVAL: Duration = Duration::from_secs(3600);

/// Token bucket for one domain
///
/// Tokens are replenished lazily from elapsed time whenever the bucket is
/// touched; there is no background refill task. All methods take `now` so the
/// arithmetic can be driven by a paused clock in tests.
#[derive(Debug, Clone)]
pub struct DomainBucket {
    pub domain: String,

    /// Tokens currently available (fractional between refills)
    pub tokens: f64,

    /// Maximum tokens the bucket holds
    pub capacity: u32,

    /// Tokens added per second
    pub refill_per_second: f64,

    /// Last time `tokens` was brought up to date
    pub last_refill: Instant,

    /// Configured defaults, restored if a crawl delay goes away
    base_capacity: u32,
    base_refill_per_second: f64,

    /// Number of tokens granted so far
    pub granted: u64,
}

impl DomainBucket {
    /// Creates a full bucket
    pub fn new(domain: &str, capacity: u32, refill_per_second: f64, now: Instant) -> Self {
        let capacity = capacity.max(1);
        let refill_per_second = bounded_rate(refill_per_second);
        Self {
            domain: domain.to_string(),
            tokens: capacity as f64,
            capacity,
            refill_per_second,
            last_refill: now,
            base_capacity: capacity,
            base_refill_per_second: refill_per_second,
            granted: 0,
        }
    }

    /// Adds the tokens accrued since the last refill
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Consumes one token if available
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            self.granted += 1;
            true
        } else {
            false
        }
    }

    /// Time until one token is available, or None if one is available now
    pub fn time_until_token(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens + TOKEN_EPSILON >= 1.0 {
            return None;
        }
        let missing = 1.0 - self.tokens;
        Some(bounded_wait(missing / self.refill_per_second))
    }

    /// Minimum spacing between two grants once the burst is spent
    pub fn min_interval(&self) -> Duration {
        bounded_wait(1.0 / self.refill_per_second)
    }

    /// Adjusts the bucket for a robots.txt crawl delay
    ///
    /// The effective interval becomes `max(1 / base_rate, delay)`. A delay can
    /// only slow the bucket down. While a delay is in force the capacity is
    /// clamped to 1 so no burst can undercut it.
    pub fn apply_crawl_delay(&mut self, crawl_delay: Option<f64>, now: Instant) {
        self.refill(now);

        let base_interval = 1.0 / self.base_refill_per_second;
        match crawl_delay {
            Some(delay) if delay.is_finite() && delay > base_interval => {
                self.refill_per_second = bounded_rate(1.0 / delay);
                self.capacity = 1;
            }
            _ => {
                self.refill_per_second = self.base_refill_per_second;
                self.capacity = self.base_capacity;
            }
        }
        self.tokens = self.tokens.min(self.capacity as f64);
    }
}

/// Keeps the refill rate at or above one token per [`MAX_TOKEN_INTERVAL`]
fn bounded_rate(refill_per_second: f64) -> f64 {
    let floor = 1.0 / MAX_TOKEN_INTERVAL.as_secs_f64();
    if refill_per_second.is_finite() {
        refill_per_second.max(floor)
    } else {
        floor
    }
}

fn bounded_wait(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds)
        .map_or(MAX_TOKEN_INTERVAL, |wait| wait.min(MAX_TOKEN_INTERVAL))
}

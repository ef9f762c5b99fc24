//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageState`: lifecycle of a single address within a run
//! - `DomainBucket`: per-domain token bucket used by the rate limiter

mod bucket;
mod page_state;

pub use bucket::DomainBucket;
pub use page_state::PageState;

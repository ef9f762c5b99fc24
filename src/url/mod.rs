//! URL handling module for Legal Spider
//!
//! Address normalization (the crawl-wide dedup key), domain key extraction and
//! the same-domain scope check.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_same_domain, robots_url};
pub use normalize::{normalize_parsed, normalize_url};

//! Output module for crawl results and reports
//!
//! This module handles:
//! - Per-address results and their status classification
//! - Run counters and the console summary
//! - The JSON report

mod report;
mod result;
pub mod stats;

pub use report::CrawlReport;
pub use result::{CrawlResult, StatusClass};
pub use stats::{print_statistics, CrawlStats};

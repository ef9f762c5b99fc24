//! Run counters and console statistics
//!
//! This module provides the final counters of a crawl run and a formatted
//! summary printed by the binary.

use crate::output::{CrawlReport, CrawlResult, StatusClass};
use crate::state::PageState;
use serde::Serialize;
use std::collections::HashMap;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Final counters of a crawl run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlStats {
    /// Pages that ended `Succeeded`
    pub pages_crawled: u64,

    /// Pages that ended `Skipped` (safety gate, robots.txt)
    pub pages_skipped: u64,

    /// Pages that ended `Failed`
    pub errors_encountered: u64,

    pub duration_seconds: f64,

    /// Internal links recorded across all results
    pub links_discovered: u64,

    /// Sum of `content_size` over all results, in bytes
    pub total_content_size: u64,

    pub total_content_size_mb: f64,
}

impl CrawlStats {
    /// Tallies counters from the result list
    pub fn from_results(results: &[CrawlResult], duration_seconds: f64) -> Self {
        let mut stats = CrawlStats {
            duration_seconds,
            ..CrawlStats::default()
        };

        for result in results {
            match result.page_state() {
                PageState::Succeeded => stats.pages_crawled += 1,
                PageState::Skipped => stats.pages_skipped += 1,
                _ => stats.errors_encountered += 1,
            }
            stats.links_discovered += result.links.len() as u64;
            stats.total_content_size += result.content_size;
        }
        stats.total_content_size_mb = stats.total_content_size as f64 / BYTES_PER_MB;

        stats
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The finished run to display
pub fn print_statistics(report: &CrawlReport) {
    let stats = &report.stats;
    let total = report.results.len() as u64;

    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Seed: {}", report.seed);
    println!("  Pages crawled: {}", stats.pages_crawled);
    println!("  Pages skipped: {}", stats.pages_skipped);
    println!("  Errors: {}", stats.errors_encountered);
    println!("  Links discovered: {}", stats.links_discovered);
    println!("  Content size: {:.2} MB", stats.total_content_size_mb);
    println!(
        "  Duration: {:.1}s ({:.2} pages/s)",
        stats.duration_seconds, report.pages_per_second
    );
    println!("  Average response time: {:.0}ms", report.avg_response_ms);
    if report.interrupted {
        println!("  Interrupted: partial results");
    }
    println!();

    println!("Results by Status:");
    let mut by_class: HashMap<StatusClass, u64> = HashMap::new();
    for result in &report.results {
        *by_class.entry(result.status_class).or_insert(0) += 1;
    }
    // Sort classes by count (descending)
    let mut class_counts: Vec<_> = by_class.into_iter().collect();
    class_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

    for (class, count) in class_counts {
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", class, count, percentage);
    }
    println!();

    println!("HTTP:");
    println!("  Requests made: {}", report.http.requests_made);
    println!("  Retries: {}", report.http.retries_performed);
    println!("  Rate limited (429): {}", report.http.rate_limited_requests);
    println!(
        "  Downloaded: {:.2} MB",
        report.http.bytes_received as f64 / BYTES_PER_MB
    );
    println!();

    println!("Frontier:");
    println!("  Addresses discovered: {}", report.frontier.total_discovered);
    println!("  Visited: {}", report.frontier.visited_count);
    println!("  Left in queue: {}", report.frontier.queue_size);
    println!();

    println!("Safety:");
    println!("  URLs checked: {}", report.safety.urls_checked);
    println!("  Auth blocks: {}", report.safety.auth_blocks);
    println!("  Filter blocks: {}", report.safety.filter_blocks);
    println!("  Form blocks: {}", report.safety.form_blocks);
    println!("  robots.txt disallowed: {}", report.policy.disallowed);
    println!();

    let success_rate = if total > 0 {
        (stats.pages_crawled as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} pages successfully crawled)",
        success_rate, stats.pages_crawled, total
    );
}

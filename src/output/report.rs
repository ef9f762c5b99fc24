use crate::crawler::{FrontierStats, HttpStats};
use crate::output::{CrawlResult, CrawlStats};
use crate::robots::PolicyStats;
use crate::safety::SafetyStats;
use crate::state::PageState;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use url::Url;

/// Everything a finished (or interrupted) run produced
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub seed: Url,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// SHA-256 of the configuration file, when one was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    pub stats: CrawlStats,
    pub pages_per_second: f64,
    pub avg_response_ms: f64,

    pub http: HttpStats,
    pub safety: SafetyStats,
    pub policy: PolicyStats,
    pub frontier: FrontierStats,

    /// True when the run stopped on a cancellation signal
    pub interrupted: bool,

    /// Addresses that ended `Succeeded`, in completion order
    pub crawled: Vec<Url>,

    /// Final state of every address that reached a terminal state
    pub page_states: BTreeMap<String, PageState>,

    pub results: Vec<CrawlResult>,
}

impl CrawlReport {
    /// Looks up the result for an address
    pub fn result_for(&self, address: &str) -> Option<&CrawlResult> {
        self.results
            .iter()
            .find(|result| result.address.as_str() == address)
    }

    /// Writes the report as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!("Results written to {}", path.display());
        Ok(())
    }
}

use crate::crawler::{FetchError, FetchOutcome};
use crate::safety::FormKind;
use crate::state::PageState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use url::Url;

/// Classification of a page's final outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
    Timeout,
    SafetySkipped,
    NetworkError,
    /// Disallowed by robots.txt
    PolicyDisallowed,
}

impl StatusClass {
    /// Classifies the last attempt of a fetch
    pub fn from_outcome(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Response { status, .. } => match status {
                200..=299 => StatusClass::Success,
                500..=599 => StatusClass::ServerError,
                // 4xx, plus informational or redirect codes left after
                // redirect following, are not retryable client-side outcomes
                _ => StatusClass::ClientError,
            },
            FetchOutcome::Error(FetchError::Timeout) => StatusClass::Timeout,
            FetchOutcome::Error(_) => StatusClass::NetworkError,
        }
    }

    /// Terminal page state this class maps to
    pub fn page_state(&self) -> PageState {
        match self {
            StatusClass::Success => PageState::Succeeded,
            StatusClass::SafetySkipped | StatusClass::PolicyDisallowed => PageState::Skipped,
            _ => PageState::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Success => "success",
            StatusClass::ClientError => "client_error",
            StatusClass::ServerError => "server_error",
            StatusClass::Timeout => "timeout",
            StatusClass::SafetySkipped => "safety_skipped",
            StatusClass::NetworkError => "network_error",
            StatusClass::PolicyDisallowed => "policy_disallowed",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one address that reached a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    pub address: Url,
    pub status_class: StatusClass,
    pub http_status: Option<u16>,

    /// Internal links found on the page, normalized, in document order
    pub links: Vec<Url>,

    pub fetched_at: DateTime<Utc>,
    pub depth: u32,
    pub parent: Option<Url>,
    pub title: Option<String>,
    pub content_type: Option<String>,

    /// Body length of the final response in bytes (0 if never fetched)
    pub content_size: u64,

    /// Forms found on an HTML page
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub form_types: Vec<FormKind>,

    /// Request attempts made (0 if never fetched)
    pub attempts: u32,

    /// Time from admission to the final response, in milliseconds
    pub elapsed_ms: u64,

    /// Why the page was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CrawlResult {
    /// Result for an address that never reached the network
    pub fn skipped(
        address: Url,
        status_class: StatusClass,
        depth: u32,
        parent: Option<Url>,
        reason: String,
    ) -> Self {
        Self {
            address,
            status_class,
            http_status: None,
            links: Vec::new(),
            fetched_at: Utc::now(),
            depth,
            parent,
            title: None,
            content_type: None,
            content_size: 0,
            form_types: Vec::new(),
            attempts: 0,
            elapsed_ms: 0,
            reason: Some(reason),
        }
    }

    pub fn page_state(&self) -> PageState {
        self.status_class.page_state()
    }
}

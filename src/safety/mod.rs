//! Safety gate
//!
//! Classifies candidate addresses before any network traffic, and fetched
//! pages before their links are trusted. Rejections are ordinary outcomes,
//! logged and counted, never errors.

mod gate;

pub use gate::{classify_forms, PatternSafetyGate};

use serde::Serialize;
use std::fmt;
use url::Url;

/// Why an address or page was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyRejection {
    /// Not an http(s) address with a host
    Malformed(String),
    TooLong { length: usize, max: usize },
    ExcludedExtension(String),
    ExcludedPath(String),
    /// Path matches an authentication or administration pattern
    AuthPattern(String),
    PasswordForm,
    /// A form posts to an authentication endpoint
    AuthFormAction(String),
}

impl fmt::Display for SafetyRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyRejection::Malformed(reason) => write!(f, "malformed address: {}", reason),
            SafetyRejection::TooLong { length, max } => {
                write!(f, "address too long: {} > {}", length, max)
            }
            SafetyRejection::ExcludedExtension(ext) => write!(f, "excluded extension {}", ext),
            SafetyRejection::ExcludedPath(path) => write!(f, "excluded path {}", path),
            SafetyRejection::AuthPattern(pattern) => {
                write!(f, "matches auth pattern {}", pattern)
            }
            SafetyRejection::PasswordForm => write!(f, "page contains a password form"),
            SafetyRejection::AuthFormAction(action) => {
                write!(f, "form posts to auth endpoint {}", action)
            }
        }
    }
}

/// Outcome of a safety check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Allow,
    Reject(SafetyRejection),
}

impl SafetyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allow)
    }
}

/// Kind of a `<form>` found on a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    /// Contains a password input
    Login,
    /// Action mentions login, signin or auth
    Auth,
    Search,
    /// Action mentions contact or feedback
    Contact,
    Generic,
}

/// Gate counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SafetyStats {
    pub urls_checked: u64,
    pub urls_blocked: u64,
    pub auth_blocks: u64,
    pub filter_blocks: u64,
    pub form_blocks: u64,
}

/// Pre- and post-fetch safety classification
///
/// Implementations must not touch the network; both checks are decided from
/// their arguments alone.
pub trait SafetyGate: Send + Sync {
    /// Decides whether `address` may be fetched at all
    fn pre_fetch_check(&self, address: &Url) -> SafetyVerdict;

    /// Decides whether links of a fetched page may be followed
    fn post_fetch_check(&self, html: &str, address: &Url) -> SafetyVerdict;

    /// Classifies the forms of a fetched page, in document order
    ///
    /// Informational only; it never affects whether links are followed.
    fn detect_forms(&self, _html: &str) -> Vec<FormKind> {
        Vec::new()
    }

    fn stats(&self) -> SafetyStats {
        SafetyStats::default()
    }
}

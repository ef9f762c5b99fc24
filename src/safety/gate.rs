use crate::config::SafetyConfig;
use crate::safety::{FormKind, SafetyGate, SafetyRejection, SafetyStats, SafetyVerdict};
use crate::ConfigError;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

#[derive(Debug, Default)]
struct GateCounters {
    urls_checked: AtomicU64,
    urls_blocked: AtomicU64,
    auth_blocks: AtomicU64,
    filter_blocks: AtomicU64,
    form_blocks: AtomicU64,
}

/// Safety gate driven by extension lists, path fragments and auth regexes
#[derive(Debug)]
pub struct PatternSafetyGate {
    avoid_auth_pages: bool,
    avoid_forms: bool,
    max_url_length: usize,
    excluded_extensions: Vec<String>,
    excluded_paths: Vec<String>,
    auth_patterns: Vec<Regex>,
    counters: GateCounters,
}

impl PatternSafetyGate {
    /// Builds the gate, compiling the auth patterns case-insensitively
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if a pattern does not compile
    pub fn new(config: &SafetyConfig) -> Result<Self, ConfigError> {
        let auth_patterns = config
            .auth_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            avoid_auth_pages: config.avoid_auth_pages,
            avoid_forms: config.avoid_forms,
            max_url_length: config.max_url_length,
            excluded_extensions: lowercase_all(&config.excluded_extensions),
            excluded_paths: lowercase_all(&config.excluded_paths),
            auth_patterns,
            counters: GateCounters::default(),
        })
    }

    fn check_structure(&self, address: &Url) -> Option<SafetyRejection> {
        if address.scheme() != "http" && address.scheme() != "https" {
            return Some(SafetyRejection::Malformed(format!(
                "scheme {} is not http(s)",
                address.scheme()
            )));
        }
        if address.host_str().map_or(true, str::is_empty) {
            return Some(SafetyRejection::Malformed("no host".to_string()));
        }
        let length = address.as_str().len();
        if length > self.max_url_length {
            return Some(SafetyRejection::TooLong {
                length,
                max: self.max_url_length,
            });
        }
        None
    }

    fn check_filters(&self, path: &str) -> Option<SafetyRejection> {
        let last_segment = path.rsplit('/').next().unwrap_or("");
        if let Some(ext) = self
            .excluded_extensions
            .iter()
            .find(|ext| last_segment.ends_with(ext.as_str()))
        {
            return Some(SafetyRejection::ExcludedExtension(ext.clone()));
        }

        self.excluded_paths
            .iter()
            .find(|fragment| path.contains(fragment.as_str()))
            .map(|fragment| SafetyRejection::ExcludedPath(fragment.clone()))
    }

    fn matching_auth_pattern(&self, path: &str) -> Option<&Regex> {
        self.auth_patterns.iter().find(|regex| regex.is_match(path))
    }

    fn block(&self, counter: &AtomicU64, address: &Url, reason: SafetyRejection) -> SafetyVerdict {
        self.counters.urls_blocked.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Blocked {}: {}", address, reason);
        SafetyVerdict::Reject(reason)
    }
}

impl SafetyGate for PatternSafetyGate {
    fn pre_fetch_check(&self, address: &Url) -> SafetyVerdict {
        self.counters.urls_checked.fetch_add(1, Ordering::Relaxed);

        if let Some(reason) = self.check_structure(address) {
            return self.block(&self.counters.filter_blocks, address, reason);
        }

        let path = address.path().to_lowercase();
        if let Some(reason) = self.check_filters(&path) {
            return self.block(&self.counters.filter_blocks, address, reason);
        }

        if self.avoid_auth_pages {
            if let Some(regex) = self.matching_auth_pattern(&path) {
                let reason = SafetyRejection::AuthPattern(regex.as_str().to_string());
                return self.block(&self.counters.auth_blocks, address, reason);
            }
        }

        SafetyVerdict::Allow
    }

    fn post_fetch_check(&self, html: &str, address: &Url) -> SafetyVerdict {
        if !self.avoid_forms {
            return SafetyVerdict::Allow;
        }

        let document = Html::parse_document(html);
        for form in forms(&document) {
            if has_password_input(&form) {
                return self.block(
                    &self.counters.form_blocks,
                    address,
                    SafetyRejection::PasswordForm,
                );
            }

            let Some(action) = form.value().attr("action") else {
                continue;
            };
            let action_path = address
                .join(action)
                .map(|target| target.path().to_lowercase())
                .unwrap_or_else(|_| action.to_lowercase());
            if self.matching_auth_pattern(&action_path).is_some() {
                return self.block(
                    &self.counters.form_blocks,
                    address,
                    SafetyRejection::AuthFormAction(action.to_string()),
                );
            }
        }

        SafetyVerdict::Allow
    }

    fn detect_forms(&self, html: &str) -> Vec<FormKind> {
        classify_forms(html)
    }

    fn stats(&self) -> SafetyStats {
        SafetyStats {
            urls_checked: self.counters.urls_checked.load(Ordering::Relaxed),
            urls_blocked: self.counters.urls_blocked.load(Ordering::Relaxed),
            auth_blocks: self.counters.auth_blocks.load(Ordering::Relaxed),
            filter_blocks: self.counters.filter_blocks.load(Ordering::Relaxed),
            form_blocks: self.counters.form_blocks.load(Ordering::Relaxed),
        }
    }
}

/// Classifies every `<form>` in `html`
///
/// A form with a password input yields `Login` and, like every other form,
/// one more kind taken from its action.
pub fn classify_forms(html: &str) -> Vec<FormKind> {
    let document = Html::parse_document(html);
    let mut kinds = Vec::new();

    for form in forms(&document) {
        if has_password_input(&form) {
            kinds.push(FormKind::Login);
        }

        let action = form.value().attr("action").unwrap_or("").to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|word| action.contains(word));
        kinds.push(if mentions(&["login", "signin", "auth"]) {
            FormKind::Auth
        } else if mentions(&["search", "query"]) {
            FormKind::Search
        } else if mentions(&["contact", "feedback"]) {
            FormKind::Contact
        } else {
            FormKind::Generic
        });
    }

    kinds
}

fn forms(document: &Html) -> Vec<ElementRef<'_>> {
    match Selector::parse("form") {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn has_password_input(form: &ElementRef<'_>) -> bool {
    let Ok(selector) = Selector::parse("input[type]") else {
        return false;
    };
    form.select(&selector).any(|input| {
        input
            .value()
            .attr("type")
            .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("password"))
    })
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|item| item.to_lowercase()).collect()
}

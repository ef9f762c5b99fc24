//! Robots.txt parser implementation
//!
//! Tokenizing is delegated to the robotstxt crate's parse callbacks; this module
//! turns the callbacks into user-agent groups and implements longest-match rule
//! evaluation on top of them.

use chrono::{DateTime, Utc};
use robotstxt::{parse_robotstxt, RobotsParseHandler};

/// One `Allow` or `Disallow` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    /// Path pattern; may contain `*` and a trailing `$`
    pub pattern: String,
    pub allow: bool,
}

impl PolicyRule {
    /// Pattern length, used as the rule's specificity
    pub fn specificity(&self) -> usize {
        self.pattern.len()
    }

    pub fn matches(&self, path: &str) -> bool {
        pattern_matches(&self.pattern, path)
    }
}

/// A run of `User-agent` lines and the directives that follow them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyGroup {
    /// Lowercase product tokens, `*` for the wildcard group
    pub agents: Vec<String>,
    pub rules: Vec<PolicyRule>,
    pub crawl_delay: Option<f64>,
}

impl PolicyGroup {
    fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|agent| agent == "*")
    }

    fn names(&self, user_agent: &str) -> bool {
        self.agents
            .iter()
            .any(|agent| agent != "*" && !agent.is_empty() && user_agent.contains(agent.as_str()))
    }
}

/// Parsed crawl policy for one domain
///
/// `valid == false` means the policy could not be obtained; such a policy
/// allows everything.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    pub domain: String,
    pub groups: Vec<PolicyGroup>,
    pub fetched_at: DateTime<Utc>,
    pub valid: bool,
}

impl DomainPolicy {
    /// Parses robots.txt content fetched for `domain`
    pub fn parse(domain: &str, content: &str) -> Self {
        let mut collector = GroupCollector::default();
        parse_robotstxt(content, &mut collector);

        Self {
            domain: domain.to_string(),
            groups: collector.groups,
            fetched_at: Utc::now(),
            valid: true,
        }
    }

    /// Policy used when robots.txt is missing or unreadable
    pub fn unavailable(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            groups: Vec::new(),
            fetched_at: Utc::now(),
            valid: false,
        }
    }

    /// Checks whether the entry is older than `ttl`
    pub fn is_stale(&self, ttl: chrono::Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }

    /// Groups that apply to `user_agent`
    ///
    /// Groups naming the agent win over wildcard groups; several matching
    /// groups are merged.
    fn groups_for(&self, user_agent: &str) -> Vec<&PolicyGroup> {
        let user_agent = user_agent.to_lowercase();

        let specific: Vec<&PolicyGroup> = self
            .groups
            .iter()
            .filter(|group| group.names(&user_agent))
            .collect();

        if !specific.is_empty() {
            return specific;
        }

        self.groups.iter().filter(|g| g.is_wildcard()).collect()
    }

    /// Rules in effect for `user_agent`, in file order
    pub fn rules(&self, user_agent: &str) -> Vec<&PolicyRule> {
        self.groups_for(user_agent)
            .into_iter()
            .flat_map(|group| group.rules.iter())
            .collect()
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If the matching groups specify none
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.groups_for(user_agent)
            .into_iter()
            .filter_map(|group| group.crawl_delay)
            .reduce(f64::max)
    }

    /// Checks if a path is allowed for the given user agent
    ///
    /// The longest matching pattern decides. When an `Allow` and a `Disallow`
    /// match with equal length, `allow_wins_ties` decides.
    ///
    /// # Arguments
    ///
    /// * `path` - Path plus query of the address (e.g., "/page?x=1")
    /// * `user_agent` - The user agent string
    /// * `allow_wins_ties` - Tie-break for equally specific rules
    pub fn is_allowed(&self, path: &str, user_agent: &str, allow_wins_ties: bool) -> bool {
        if !self.valid || path == "/robots.txt" {
            return true;
        }

        let mut best_allow: Option<usize> = None;
        let mut best_disallow: Option<usize> = None;

        for rule in self.rules(user_agent) {
            if !rule.matches(path) {
                continue;
            }
            let best = if rule.allow {
                &mut best_allow
            } else {
                &mut best_disallow
            };
            *best = Some(best.map_or(rule.specificity(), |b| b.max(rule.specificity())));
        }

        match (best_allow, best_disallow) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) if allow == disallow => allow_wins_ties,
            (Some(allow), Some(disallow)) => allow > disallow,
        }
    }
}

/// Builds groups from the robotstxt tokenizer callbacks
#[derive(Default)]
struct GroupCollector {
    groups: Vec<PolicyGroup>,
    in_agent_run: bool,
}

impl GroupCollector {
    fn push_rule(&mut self, value: &str, allow: bool) {
        self.in_agent_run = false;
        // An empty Disallow means "nothing is disallowed"
        if value.is_empty() {
            return;
        }
        if let Some(group) = self.groups.last_mut() {
            group.rules.push(PolicyRule {
                pattern: value.to_string(),
                allow,
            });
        }
    }
}

impl RobotsParseHandler for GroupCollector {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        if !self.in_agent_run || self.groups.is_empty() {
            self.groups.push(PolicyGroup::default());
        }
        self.in_agent_run = true;

        let token = user_agent
            .split('/')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if let Some(group) = self.groups.last_mut() {
            group.agents.push(token);
        }
    }

    fn handle_allow(&mut self, _line_num: u32, value: &str) {
        self.push_rule(value, true);
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.push_rule(value, false);
    }

    fn handle_sitemap(&mut self, _line_num: u32, _value: &str) {}

    fn handle_unknown_action(&mut self, _line_num: u32, action: &str, value: &str) {
        if !action.eq_ignore_ascii_case("crawl-delay") {
            return;
        }
        self.in_agent_run = false;

        let delay = value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d >= 0.0);
        if let (Some(delay), Some(group)) = (delay, self.groups.last_mut()) {
            group.crawl_delay = Some(delay);
        }
    }
}

/// Matches a robots.txt path pattern against a path
///
/// `*` matches any run of characters; a trailing `$` anchors the end.
/// Without `$` the pattern only has to match a prefix of the path.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let p = pattern.as_bytes();
    let s = path.as_bytes();
    let (mut pi, mut si) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while si < s.len() {
        if pi == p.len() && !anchored {
            return true;
        }
        if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            mark = si;
            pi += 1;
        } else if pi < p.len() && p[pi] == s[si] {
            pi += 1;
            si += 1;
        } else if let Some(star_at) = star {
            pi = star_at + 1;
            mark += 1;
            si = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

use serde::Serialize;
use std::fmt;

/// Page lifecycle states for one address within a crawl run
///
/// An address moves `Discovered -> Queued -> Admitted -> Fetching` and ends
/// in exactly one of `Succeeded`, `Skipped` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    // ===== Active States =====
    /// Seen as a link, not yet accepted by the frontier
    Discovered,

    /// Accepted by the frontier and waiting to be popped
    Queued,

    /// Passed the safety gate, robots policy and page budget; waiting for a rate token
    Admitted,

    /// A fetch attempt is on the network
    Fetching,

    // ===== Terminal States =====
    /// Fetched and processed
    Succeeded,

    /// Never fetched, or fetched but not expanded (safety, robots, budget)
    Skipped,

    /// Fetch ended in a terminal error
    Failed,
}

impl PageState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: PageState) -> bool {
        use PageState::*;
        matches!(
            (self, next),
            (Discovered, Queued)
                | (Queued, Admitted)
                | (Queued, Skipped)
                | (Admitted, Fetching)
                | (Admitted, Skipped)
                | (Fetching, Succeeded)
                | (Fetching, Skipped)
                | (Fetching, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Queued => "queued",
            Self::Admitted => "admitted",
            Self::Fetching => "fetching",
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!PageState::Discovered.is_terminal());
        assert!(!PageState::Queued.is_terminal());
        assert!(!PageState::Admitted.is_terminal());
        assert!(!PageState::Fetching.is_terminal());

        assert!(PageState::Succeeded.is_terminal());
        assert!(PageState::Skipped.is_terminal());
        assert!(PageState::Failed.is_terminal());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(PageState::Discovered.can_transition_to(PageState::Queued));
        assert!(PageState::Queued.can_transition_to(PageState::Admitted));
        assert!(PageState::Admitted.can_transition_to(PageState::Fetching));
        assert!(PageState::Fetching.can_transition_to(PageState::Succeeded));
        assert!(PageState::Fetching.can_transition_to(PageState::Failed));
    }

    #[test]
    fn test_skip_never_reaches_network() {
        // A pre-fetch rejection goes straight from Queued to Skipped
        assert!(PageState::Queued.can_transition_to(PageState::Skipped));
        assert!(!PageState::Queued.can_transition_to(PageState::Fetching));
        assert!(!PageState::Discovered.can_transition_to(PageState::Admitted));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [PageState::Succeeded, PageState::Skipped, PageState::Failed] {
            for next in [
                PageState::Discovered,
                PageState::Queued,
                PageState::Admitted,
                PageState::Fetching,
                PageState::Succeeded,
                PageState::Skipped,
                PageState::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PageState::Discovered), "discovered");
        assert_eq!(format!("{}", PageState::Succeeded), "succeeded");
        assert_eq!(
            serde_json::to_string(&PageState::Skipped).unwrap(),
            "\"skipped\""
        );
    }
}

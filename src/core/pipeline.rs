//! Explicit filter ordering for the request pipeline.
//!
//! The chain executes in a fixed declared precedence; each phase has a
//! distinct priority so no two filters ever rely on incidental tie-breaking.
//! A phase either short-circuits with a terminal response or passes control
//! forward; the cookie watch phase only observes the final response.

/// The ordered phases of the edge pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterPhase {
    /// Request id + client IP resolution, before everything else.
    RequestContext,
    /// Public-path bypass, bearer extraction, 401 on missing credential.
    Auth,
    /// Shared-store counting, 429 on quota.
    RateLimit,
    /// Route table lookup and rewrite.
    Route,
    /// Breaker/retry-wrapped backend dispatch (or fallback).
    Dispatch,
    /// Set-Cookie observation on the final response, auth paths only.
    CookieWatch,
}

impl FilterPhase {
    /// Every phase, in execution order.
    pub const ORDERED: [FilterPhase; 6] = [
        FilterPhase::RequestContext,
        FilterPhase::Auth,
        FilterPhase::RateLimit,
        FilterPhase::Route,
        FilterPhase::Dispatch,
        FilterPhase::CookieWatch,
    ];

    /// Explicit priority; lower runs earlier. Gaps leave room for
    /// deployment-specific filters without renumbering.
    pub fn priority(self) -> u8 {
        match self {
            FilterPhase::RequestContext => 0,
            FilterPhase::Auth => 10,
            FilterPhase::RateLimit => 20,
            FilterPhase::Route => 30,
            FilterPhase::Dispatch => 40,
            FilterPhase::CookieWatch => 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_strictly_increasing() {
        let priorities: Vec<u8> = FilterPhase::ORDERED.iter().map(|p| p.priority()).collect();
        for pair in priorities.windows(2) {
            assert!(pair[0] < pair[1], "phases {pair:?} share or invert priority");
        }
    }

    #[test]
    fn test_no_duplicate_priorities() {
        let mut priorities: Vec<u8> =
            FilterPhase::ORDERED.iter().map(|p| p.priority()).collect();
        priorities.sort_unstable();
        priorities.dedup();
        assert_eq!(priorities.len(), FilterPhase::ORDERED.len());
    }

    #[test]
    fn test_context_first_cookie_watch_last() {
        assert_eq!(FilterPhase::ORDERED[0], FilterPhase::RequestContext);
        assert_eq!(
            FilterPhase::ORDERED[FilterPhase::ORDERED.len() - 1],
            FilterPhase::CookieWatch
        );
    }
}

//! Fixed-interval pacing between completion calls, rounds and matches.
//!
//! Calls are strictly sequential; these gaps keep a shared, rate-limited
//! backend under its budget.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingPolicy {
    /// Gap between agent A's call and agent B's call in a round
    pub between_calls: Duration,
    /// Gap after a round before the next one starts
    pub between_rounds: Duration,
    /// Cooldown between tournament games
    pub between_matches: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy {
            between_calls: Duration::from_secs(15),
            between_rounds: Duration::from_secs(15),
            between_matches: Duration::from_secs(120),
        }
    }
}

impl PacingPolicy {
    /// No waiting anywhere.
    pub fn none() -> Self {
        PacingPolicy {
            between_calls: Duration::ZERO,
            between_rounds: Duration::ZERO,
            between_matches: Duration::ZERO,
        }
    }

    /// Tightest spacing between two consecutive backend calls.
    pub fn min_call_spacing(&self) -> Duration {
        self.between_calls.min(self.between_rounds)
    }

    /// True when calls would be spaced tighter than `required`.
    pub fn is_tighter_than(&self, required: Duration) -> bool {
        self.min_call_spacing() < required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = PacingPolicy::default();
        assert_eq!(p.between_calls, Duration::from_secs(15));
        assert_eq!(p.between_matches, Duration::from_secs(120));
        assert_eq!(PacingPolicy::none().min_call_spacing(), Duration::ZERO);
    }

    #[test]
    fn tighter_than_rate_limit() {
        let p = PacingPolicy::default();
        assert!(!p.is_tighter_than(Duration::from_millis(500)));
        assert!(PacingPolicy::none().is_tighter_than(Duration::from_millis(500)));
    }
}

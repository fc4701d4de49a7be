//! Run-wide wall-clock budget.
//!
//! A [`Deadline`] is created once per invocation and checked before committing
//! to more work (a listing page, a pagination hop, a batch). Exceeding it is
//! a control-flow signal, never an error.

use std::time::{Duration, Instant};

/// Default budget: headroom below a 300 s serverless execution limit.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 270;

/// A fixed point in time after which no new work should start.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + budget,
        }
    }

    /// Whether the budget has been used up.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left before the deadline (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Time since the deadline was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::after(Duration::from_secs(DEFAULT_TIME_BUDGET_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_expired() {
        let d = Deadline::after(Duration::ZERO);
        assert!(d.is_expired());
        assert_eq!(d.remaining(), Duration::ZERO);
    }

    #[test]
    fn default_budget_has_headroom() {
        let d = Deadline::default();
        assert!(!d.is_expired());
        assert!(d.remaining() > Duration::from_secs(260));
    }
}

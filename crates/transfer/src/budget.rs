// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::time::Instant;

/// Time reserved at the end of an export invocation for the final shard
/// upload and the return path. Must exceed the worst-case shard upload.
pub const EXPORT_SAFETY_MARGIN: Duration = Duration::from_millis(3000);

/// Time reserved at the end of an import invocation; a batch write that
/// is already in flight may take this long to come back.
pub const IMPORT_SAFETY_MARGIN: Duration = Duration::from_millis(2500);

/// Wall-clock budget of one invocation
///
/// New work starts only before the cutoff (`deadline - margin`). Work already
/// in flight may run until the hard deadline and is abandoned after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    started: Instant,
    deadline: Instant,
    margin: Duration,
}

impl TimeBudget {
    /// Budget of `budget` starting now
    #[must_use]
    pub fn new(budget: Duration, margin: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + budget,
            margin,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    #[must_use]
    pub fn cutoff(&self) -> Instant {
        self.deadline
            .checked_sub(self.margin)
            .map_or(self.started, |cutoff| cutoff.max(self.started))
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        Instant::now() >= self.cutoff()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cutoff_reserves_margin() {
        let budget = TimeBudget::new(Duration::from_secs(10), Duration::from_secs(3));
        assert_eq!(budget.cutoff() - Instant::now(), Duration::from_secs(7));
        assert!(!budget.exhausted());

        tokio::time::advance(Duration::from_secs(7)).await;
        assert!(budget.exhausted());
        assert!(Instant::now() < budget.deadline());
        assert_eq!(budget.elapsed_ms(), 7000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_smaller_than_margin_is_exhausted_at_once() {
        let budget = TimeBudget::new(Duration::from_secs(1), Duration::from_secs(3));
        assert!(budget.exhausted());
        assert_eq!(budget.cutoff(), Instant::now());
    }
}

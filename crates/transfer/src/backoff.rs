// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff bound to an invocation cutoff

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::time::Duration;
use tokio::time::Instant;

/// First delay of a fresh sequence
pub const BASE_INTERVAL: Duration = Duration::from_millis(500);

/// No single delay exceeds this
pub const MAX_INTERVAL: Duration = Duration::from_millis(1500);

/// Delay generator for throttled requests
///
/// Delays double from the base interval up to the ceiling, with additive
/// jitter smaller than the current step, so a sequence never shrinks until
/// it reaches the ceiling. A delay is truncated at the cutoff. One policy
/// lives for one invocation and is never persisted.
pub struct BackoffPolicy {
    base: Duration,
    ceiling: Duration,
    jitter: bool,
    cutoff: Instant,
    delays: ExponentialBackoff,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(cutoff: Instant) -> Self {
        Self::with_intervals(BASE_INTERVAL, MAX_INTERVAL, true, cutoff)
    }

    #[must_use]
    pub fn with_intervals(base: Duration, ceiling: Duration, jitter: bool, cutoff: Instant) -> Self {
        let delays = Self::builder(base, ceiling, jitter).build();
        Self {
            base,
            ceiling,
            jitter,
            cutoff,
            delays,
        }
    }

    fn builder(base: Duration, ceiling: Duration, jitter: bool) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(base)
            .with_max_delay(ceiling)
            .with_factor(2.0)
            .with_max_times(usize::MAX);
        if jitter { builder.with_jitter() } else { builder }
    }

    /// Next delay in the sequence, truncated so it never passes the cutoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delays.next().unwrap_or(self.ceiling).min(self.ceiling);
        delay.min(self.cutoff.saturating_duration_since(Instant::now()))
    }

    /// Start over from the base interval
    pub fn reset(&mut self) {
        self.delays = Self::builder(self.base, self.ceiling, self.jitter).build();
    }

    /// Sleep for the next delay. Returns false when the cutoff was reached
    /// and the caller should stop retrying.
    pub async fn wait(&mut self) -> bool {
        let delay = self.next_delay();
        if delay.is_zero() {
            return false;
        }
        tokio::time::sleep(delay).await;
        Instant::now() < self.cutoff
    }
}

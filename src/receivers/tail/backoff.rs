// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Exponential backoff state: doubles on each failure up to a cap, and returns to
/// the initial delay on success.
///
/// The first `grace` failures after a reset do not wait at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    grace: u32,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            grace: 0,
            current: initial,
            failures: 0,
        }
    }

    /// Allow `grace` consecutive failures before delays start.
    pub fn with_grace(mut self, grace: u32) -> Self {
        self.grace = grace;
        self
    }

    /// Record a failure and return how long to wait before trying again.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        if self.failures <= self.grace {
            return Duration::ZERO;
        }

        let delay = std::cmp::min(self.current, self.max);
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    /// Record a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

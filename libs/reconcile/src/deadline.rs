use std::time::Duration;

use tokio::time::Instant;

/// A fixed time budget.
///
/// Measured on the tokio clock so paused-time tests are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.saturating_sub(self.remaining())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Sleep until the deadline.
    pub async fn expired(&self) {
        tokio::time::sleep_until(self.at).await
    }

    /// Sleep for `interval`, cut short by the deadline.
    pub async fn sleep_within(&self, interval: Duration) {
        tokio::time::sleep(interval.min(self.remaining())).await
    }
}

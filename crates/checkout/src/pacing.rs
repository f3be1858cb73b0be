//! Artificial delays that widen the windows between purchase steps.

use std::time::Duration;

/// Delays inserted into the purchase paths.
///
/// `between_writes` separates the cart write from the stock decrement in the
/// uncoordinated path. `before_commit` holds a transaction open, with both
/// writes staged and locked, before it commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pacing {
    between_writes: Duration,
    before_commit: Duration,
}

impl Pacing {
    /// No delay.
    pub fn none() -> Self {
        Self::default()
    }

    /// Waits `delay` between the two uncoordinated writes.
    pub fn between_writes(delay: Duration) -> Self {
        Self {
            between_writes: delay,
            ..Self::default()
        }
    }

    /// Keeps each transaction open for `delay` before committing.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.before_commit = delay;
        self
    }

    /// Returns the delay between the two uncoordinated writes.
    pub fn delay(&self) -> Duration {
        self.between_writes
    }

    pub fn commit_delay(&self) -> Duration {
        self.before_commit
    }

    pub(crate) async fn pause_between_writes(&self) {
        sleep(self.between_writes).await;
    }

    pub(crate) async fn pause_before_commit(&self) {
        sleep(self.before_commit).await;
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

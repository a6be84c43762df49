//! Confirmation polling policy.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorPolicy {
    /// Delay between receipt polls.
    pub interval: Duration,
    /// Total number of polls, the immediate one included.
    pub max_attempts: u32,
}

impl MonitorPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on how long a monitor can run.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

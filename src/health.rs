//! Connection health tracking and cooldown backoff.

use std::time::Duration;

use crate::config::HealthSettings;

/// Blocking pause, injectable so retry and cooldown schedules can be observed.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// What the caller must do before the next acquisition attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Proceed,
    Cooldown(Duration),
}

/// Counts consecutive acquisition failures across both readers.
#[derive(Clone, Debug)]
pub struct ConnectionHealthMonitor {
    consecutive_failures: u32,
    failure_threshold: u32,
    cooldown: Duration,
}

impl Default for ConnectionHealthMonitor {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(2))
    }
}

impl ConnectionHealthMonitor {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            failure_threshold,
            cooldown,
        }
    }

    pub fn from_settings(settings: &HealthSettings) -> Self {
        Self::new(settings.failure_threshold, settings.cooldown)
    }

    /// A frame arrived from either reader.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            log::info!(
                "camera connection recovered after {} failed iterations",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Both readers failed. Returns the pause required before the next attempt;
    /// cooling down does not reset the counter.
    pub fn record_failure(&mut self) -> Backoff {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures > self.failure_threshold {
            Backoff::Cooldown(self.cooldown)
        } else {
            Backoff::Proceed
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_starts_after_threshold_is_exceeded() {
        let mut monitor = ConnectionHealthMonitor::default();
        for _ in 0..10 {
            assert_eq!(monitor.record_failure(), Backoff::Proceed);
        }
        assert_eq!(
            monitor.record_failure(),
            Backoff::Cooldown(Duration::from_secs(2))
        );
        assert_eq!(monitor.consecutive_failures(), 11);
        // Cooling down alone does not clear the streak.
        assert_eq!(
            monitor.record_failure(),
            Backoff::Cooldown(Duration::from_secs(2))
        );
        assert_eq!(monitor.consecutive_failures(), 12);
    }

    #[test]
    fn single_success_resets_the_counter() {
        let mut monitor = ConnectionHealthMonitor::default();
        for _ in 0..5 {
            monitor.record_failure();
        }
        assert_eq!(monitor.consecutive_failures(), 5);
        monitor.record_success();
        assert_eq!(monitor.consecutive_failures(), 0);
        assert_eq!(monitor.record_failure(), Backoff::Proceed);
    }
}

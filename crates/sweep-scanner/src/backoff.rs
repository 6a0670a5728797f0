//! Request pacing and retry backoff.
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can record the
//! requested delays instead of waiting them out.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Something that can wait for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Uniform random delay taken before every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacing {
    min: Duration,
    max: Duration,
}

impl RequestPacing {
    /// Pacing between `min` and `max` inclusive. The bounds are swapped if
    /// given in the wrong order.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw the next delay.
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Per-key retry state: attempt count and the delay before the next attempt.
///
/// The delay starts at the initial backoff and doubles after every retried
/// failure. Once `max_attempts` attempts have failed, [`Backoff::on_failure`]
/// returns `None` and the key is given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    max_attempts: u32,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    /// Fresh state allowing `max_attempts` attempts in total.
    #[must_use]
    pub fn new(initial: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
            next_delay: initial,
        }
    }

    /// Failed attempts recorded so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failed attempt. Returns the delay to wait before retrying,
    /// or `None` when the budget is spent.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self.next_delay;
        self.next_delay = self.next_delay.saturating_mul(2);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_budget_spent() {
        let mut backoff = Backoff::new(Duration::from_secs(2), 5);
        assert_eq!(backoff.on_failure(), Some(Duration::from_secs(2)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_secs(4)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_secs(8)));
        assert_eq!(backoff.on_failure(), Some(Duration::from_secs(16)));
        assert_eq!(backoff.on_failure(), None);
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_backoff_single_attempt() {
        let mut backoff = Backoff::new(Duration::from_secs(2), 1);
        assert_eq!(backoff.on_failure(), None);

        // zero is clamped to one attempt
        let mut backoff = Backoff::new(Duration::from_secs(2), 0);
        assert_eq!(backoff.max_attempts(), 1);
        assert_eq!(backoff.on_failure(), None);
    }

    #[test]
    fn test_pacing_sample_within_bounds() {
        let pacing = RequestPacing::new(Duration::from_millis(2000), Duration::from_millis(5000));
        for _ in 0..100 {
            let delay = pacing.sample();
            assert!(delay >= pacing.min() && delay <= pacing.max());
        }
    }

    #[test]
    fn test_pacing_fixed_and_swapped_bounds() {
        let fixed = RequestPacing::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(fixed.sample(), Duration::ZERO);

        let swapped = RequestPacing::new(Duration::from_secs(5), Duration::from_secs(2));
        assert_eq!(swapped.min(), Duration::from_secs(2));
        assert_eq!(swapped.max(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_advances_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(3)).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}

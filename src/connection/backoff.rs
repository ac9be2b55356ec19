//! Exponential backoff gate for reconnection attempts.

use std::time::{Duration, Instant};

use super::config::{BackoffPolicy, deadline_after};

/// Tracks when the next connection attempt is permitted.
///
/// `retry_time` is `None` until a connection attempt fails and again after
/// any successful connect, so the first failure after a success always waits
/// `policy.start`.
#[derive(Clone, Debug)]
pub struct BackoffState {
    policy: BackoffPolicy,
    retry_time: Option<Instant>,
    retry_period: Duration,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            retry_period: policy.start,
            retry_time: None,
            policy,
        }
    }

    /// Whether a connection attempt may be made at `now`.
    pub fn may_attempt(&self, now: Instant) -> bool {
        self.retry_time.is_none_or(|retry_time| now >= retry_time)
    }

    /// Clear the backoff window after a successful connect.
    pub fn record_success(&mut self) {
        self.retry_time = None;
    }

    /// Register a failed connect at `now` and return the new retry period.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.retry_period = match self.retry_time {
            None => self.policy.start,
            Some(_) => self.grow(),
        };
        self.retry_time = Some(deadline_after(now, self.retry_period));
        self.retry_period
    }

    fn grow(&self) -> Duration {
        let scaled = self.retry_period.as_secs_f64() * self.policy.factor;
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.policy.max)
            .min(self.policy.max)
    }

    /// Instant after which the next attempt is permitted, if backing off.
    pub fn retry_time(&self) -> Option<Instant> {
        self.retry_time
    }

    /// Most recently applied retry period.
    pub fn retry_period(&self) -> Duration {
        self.retry_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn default_sequence_doubles_then_caps() {
        let mut backoff = BackoffState::new(BackoffPolicy::default());
        let now = Instant::now();
        let periods: Vec<f64> = (0..9)
            .map(|_| backoff.record_failure(now).as_secs_f64())
            .collect();
        assert_eq!(periods, vec![1.0, 2.0, 4.0, 8.0, 16.0, 30.0, 30.0, 30.0, 30.0]);
    }

    #[rstest]
    fn success_resets_to_start() {
        let mut backoff = BackoffState::new(BackoffPolicy::default());
        let now = Instant::now();
        for _ in 0..4 {
            backoff.record_failure(now);
        }
        backoff.record_success();
        assert!(backoff.retry_time().is_none());
        assert_eq!(backoff.record_failure(now), Duration::from_secs(1));
    }

    #[rstest]
    fn gate_closes_until_retry_time() {
        let mut backoff = BackoffState::new(BackoffPolicy::default());
        let now = Instant::now();
        assert!(backoff.may_attempt(now));

        backoff.record_failure(now);

        assert!(!backoff.may_attempt(now));
        assert!(!backoff.may_attempt(now + Duration::from_millis(999)));
        assert!(backoff.may_attempt(now + Duration::from_secs(1)));
    }

    #[rstest]
    fn huge_factor_saturates_at_max() {
        let policy = BackoffPolicy {
            start: Duration::from_secs(1),
            max: Duration::from_secs(5),
            factor: f64::MAX,
        };
        let mut backoff = BackoffState::new(policy);
        let now = Instant::now();
        backoff.record_failure(now);
        assert_eq!(backoff.record_failure(now), Duration::from_secs(5));
    }

    #[rstest]
    fn unrepresentable_retry_time_saturates() {
        let policy = BackoffPolicy {
            start: Duration::MAX,
            max: Duration::MAX,
            factor: 2.0,
        };
        let mut backoff = BackoffState::new(policy);
        let now = Instant::now();

        assert_eq!(backoff.record_failure(now), Duration::MAX);
        assert_eq!(backoff.record_failure(now), Duration::MAX);
        assert!(!backoff.may_attempt(now + Duration::from_secs(365 * 24 * 60 * 60)));
    }

    proptest! {
        #[test]
        fn periods_never_exceed_max(
            start_ms in 1u64..5_000,
            extra_ms in 0u64..60_000,
            factor in 1.0f64..10.0,
            failures in 1usize..40,
        ) {
            let policy = BackoffPolicy {
                start: Duration::from_millis(start_ms),
                max: Duration::from_millis(start_ms + extra_ms),
                factor,
            };
            let max = policy.max;
            let mut backoff = BackoffState::new(policy);
            let now = Instant::now();
            for _ in 0..failures {
                prop_assert!(backoff.record_failure(now) <= max);
            }
        }
    }
}

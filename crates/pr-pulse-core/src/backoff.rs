//! Retry delay policy.
//!
//! Delays grow as `base * 2^attempt` and are clamped to `cap`. Two call
//! families are preconfigured: search pages (1 s base, 10 s cap) and
//! per-PR enrichment (250 ms base, 5 s cap).
//!
//! ```rust
//! use pr_pulse_core::backoff::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::search();
//! assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
//! assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
//! assert_eq!(policy.delay_for(4), Duration::from_millis(10_000));
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Retries allowed after the first failure.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_attempts,
        }
    }

    pub fn search() -> Self {
        Self::new(
            Duration::from_millis(1000),
            Duration::from_secs(10),
            Self::DEFAULT_MAX_ATTEMPTS,
        )
    }

    pub fn enrichment() -> Self {
        Self::new(
            Duration::from_millis(250),
            Duration::from_secs(5),
            Self::DEFAULT_MAX_ATTEMPTS,
        )
    }

    /// `min(base * 2^attempt, cap)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    /// Delay before the next attempt, stretched toward a server-provided
    /// reset time but never beyond `cap`.
    pub fn delay_with_hint(
        &self,
        attempt: u32,
        reset_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Duration {
        let computed = self.delay_for(attempt);
        match reset_at {
            Some(reset) => {
                let hint = (reset - now).to_std().unwrap_or(Duration::ZERO);
                computed.max(hint).min(self.cap)
            }
            None => computed,
        }
    }

    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::search()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_delays_are_monotonic_and_capped() {
        for policy in [BackoffPolicy::search(), BackoffPolicy::enrichment()] {
            let mut prev = Duration::ZERO;
            for attempt in 0..40 {
                let d = policy.delay_for(attempt);
                assert!(d >= prev, "delay shrank at attempt {}", attempt);
                assert!(d <= policy.cap);
                prev = d;
            }
            assert_eq!(prev, policy.cap);
        }
    }

    #[test]
    fn test_enrichment_schedule() {
        let p = BackoffPolicy::enrichment();
        let ms: Vec<u128> = (0..6).map(|a| p.delay_for(a).as_millis()).collect();
        assert_eq!(ms, vec![250, 500, 1000, 2000, 4000, 5000]);
    }

    #[test]
    fn test_reset_hint_stretches_but_respects_cap() {
        let p = BackoffPolicy::search();
        let now = Utc::now();
        let soon = now + ChronoDuration::seconds(3);
        assert_eq!(p.delay_with_hint(0, Some(soon), now), Duration::from_secs(3));

        let far = now + ChronoDuration::minutes(30);
        assert_eq!(p.delay_with_hint(0, Some(far), now), p.cap);

        let past = now - ChronoDuration::seconds(5);
        assert_eq!(p.delay_with_hint(1, Some(past), now), p.delay_for(1));
    }

    #[test]
    fn test_cap_never_below_base() {
        let p = BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(1), 3);
        assert_eq!(p.cap, Duration::from_secs(2));
        assert!(p.can_retry(2));
        assert!(!p.can_retry(3));
    }
}

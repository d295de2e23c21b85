//! Exponential retry policy (§4.C "Retry policy"), grounded on
//! `ExponentialRetryPolicy` in `retry.py`. The interval/backoff walk is
//! hand-rolled rather than built on the `exponential-backoff` crate's
//! iterator: that crate jitters and caps by elapsed wall-clock time, while
//! this policy needs the exact `base * factor^attempt` sequence the original
//! client uses so retry timing stays predictable for callers tuning
//! `max_retries`/`retry_base_interval`/`retry_factor`.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_interval: Duration,
    pub factor: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_interval: Duration, factor: f64) -> Self {
        Self {
            max_retries,
            base_interval,
            factor,
        }
    }

    /// Sleep duration before attempt `attempt` (0-indexed retry count, i.e.
    /// the *n*-th retry after the initial attempt).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let millis = self.base_interval.as_secs_f64() * self.factor.powi(attempt as i32) * 1000.0;
        Duration::from_millis(millis.max(0.0) as u64)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1), 4.0)
    }
}

/// Transport-level exceptions are always retryable; for HTTP responses, only
/// this status set is retried (§4.C "Retryable").
pub fn is_retryable_status(status: u16) -> bool {
    if status == 501 || status == 505 {
        return false;
    }
    matches!(status, 401 | 408 | 429) || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        let p = RetryPolicy::new(5, Duration::from_millis(100), 2.0);
        assert_eq!(p.backoff_for(0), Duration::from_millis(100));
        assert_eq!(p.backoff_for(1), Duration::from_millis(200));
        assert_eq!(p.backoff_for(2), Duration::from_millis(400));
    }

    #[test]
    fn retryable_status_set_matches_spec() {
        assert!(is_retryable_status(401));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(501));
        assert!(!is_retryable_status(505));
        assert!(!is_retryable_status(403));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(200));
        assert!(!is_retryable_status(301));
    }
}

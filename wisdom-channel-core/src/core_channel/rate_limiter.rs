/*
    Rate Limiter - sliding window over inbound poll attempts

    Bounds how often the worker touches the mailbox. One limiter guards the
    inbound path of a provider; it is not keyed per peer. A rejected
    attempt is not recorded, so a flood of rejected attempts does not push
    the window forward.
*/

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::trace;

/// Configuration for the inbound limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Admitted attempts per window
    pub max_per_window: usize,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterConfig {
            max_per_window: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        SlidingWindowLimiter {
            limit,
            window,
            admitted: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    pub fn from_config(config: &RateLimiterConfig) -> Self {
        Self::new(config.max_per_window, config.window)
    }

    /// Admit an attempt at `now`, or refuse without recording it
    pub fn allow(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }

        if self.admitted.len() >= self.limit {
            trace!(in_window = self.admitted.len(), limit = self.limit, "poll attempt refused");
            return false;
        }

        self.admitted.push_back(now);
        true
    }

    /// Attempts currently counted in the window
    pub fn in_window(&self) -> usize {
        self.admitted.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_then_refuse() {
        let mut limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.allow(t0));
        assert!(limiter.allow(t0 + Duration::from_secs(1)));
        assert!(limiter.allow(t0 + Duration::from_secs(2)));
        assert!(!limiter.allow(t0 + Duration::from_secs(3)));
        assert_eq!(limiter.in_window(), 3);
    }

    #[test]
    fn test_window_boundary() {
        // limit 2 over 60s: admitted at 0 and 1, refused at 2
        let mut limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.allow(t0));
        assert!(limiter.allow(t0 + Duration::from_secs(1)));
        assert!(!limiter.allow(t0 + Duration::from_secs(2)));

        // just before t0 leaves the window
        assert!(!limiter.allow(t0 + Duration::from_millis(59_999)));
        // t0 is pruned once now - t0 == window
        assert!(limiter.allow(t0 + Duration::from_secs(60)));
        assert!(!limiter.allow(t0 + Duration::from_millis(60_500)));
        assert!(limiter.allow(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_refusals_are_not_recorded() {
        let mut limiter = SlidingWindowLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(limiter.allow(t0));
        for i in 1..100 {
            assert!(!limiter.allow(t0 + Duration::from_millis(i * 50)));
        }
        assert_eq!(limiter.in_window(), 1);
        assert!(limiter.allow(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_count_never_exceeds_limit() {
        let mut limiter = SlidingWindowLimiter::new(5, Duration::from_secs(1));
        let t0 = Instant::now();
        for i in 0..1000 {
            limiter.allow(t0 + Duration::from_millis(i * 7));
            assert!(limiter.in_window() <= limiter.limit());
        }
    }
}

//! Async test helpers
//!
//! The channel is polled, so tests observe it by waiting for a condition
//! rather than receiving on a channel.

use std::future::Future;
use tokio::time::{sleep, timeout, Duration, Instant};

/// Default timeout for a condition to become true (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How often `wait_until` re-checks its condition
pub const CHECK_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    Elapsed,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation timed out")
    }
}

impl std::error::Error for TimeoutError {}

/// Run a future with a timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future).await.map_err(|_| TimeoutError::Elapsed)
}

/// Poll `condition` until it holds or `limit` passes. Returns whether it held.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(CHECK_INTERVAL).await;
    }
}

/// Keep `condition` checked for the whole of `period`; false as soon as it fails
pub async fn holds_for<F>(period: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + period;
    while Instant::now() < deadline {
        if !condition() {
            return false;
        }
        sleep(CHECK_INTERVAL).await;
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_until_sees_change() {
        let counter = Arc::new(AtomicUsize::new(0));
        let writer = counter.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            writer.store(1, Ordering::SeqCst);
        });

        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || counter.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test]
    async fn test_wait_until_gives_up() {
        assert!(!wait_until(Duration::from_millis(20), || false).await);
    }

    #[tokio::test]
    async fn test_holds_for() {
        assert!(holds_for(Duration::from_millis(20), || true).await);
        assert!(!holds_for(Duration::from_millis(20), || false).await);
    }

    #[tokio::test]
    async fn test_with_timeout() {
        assert_eq!(with_timeout(Duration::from_millis(50), async { 7 }).await, Ok(7));
        assert_eq!(
            with_timeout(Duration::from_millis(10), sleep(Duration::from_secs(5))).await,
            Err(TimeoutError::Elapsed)
        );
    }
}

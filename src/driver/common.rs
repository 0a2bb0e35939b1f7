//! Shared polling helpers for page drivers and the healer.

use std::future::Future;
use std::time::{Duration, Instant};

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub use_exponential_backoff: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            initial_interval_ms: 100,
            max_interval_ms: 500,
            use_exponential_backoff: true,
        }
    }
}

impl PollConfig {
    /// Fixed-interval polling
    pub fn fixed(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            initial_interval_ms: interval_ms.max(1),
            max_interval_ms: interval_ms.max(1),
            use_exponential_backoff: false,
        }
    }
}

/// Generic polling function with optional exponential backoff
///
/// Calls `check_fn` repeatedly until it returns `true` or timeout is reached.
/// The check always runs at least once, even with a zero timeout.
/// Returns `true` if condition was met, `false` if timed out.
pub async fn wait_until<F, Fut>(check_fn: F, config: PollConfig) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut interval = config.initial_interval_ms;

    loop {
        if check_fn().await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }

        tokio::time::sleep(Duration::from_millis(interval)).await;

        if config.use_exponential_backoff {
            interval = (interval * 3 / 2).min(config.max_interval_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_wait_until_succeeds_after_a_few_polls() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let met = wait_until(
            move || async move { calls_ref.fetch_add(1, Ordering::SeqCst) >= 2 },
            PollConfig::fixed(1_000, 1),
        )
        .await;
        assert!(met);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_zero_timeout_checks_once() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let met = wait_until(
            move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                false
            },
            PollConfig::fixed(0, 1),
        )
        .await;
        assert!(!met);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Retry with exponential backoff
//!
//! Only `Transient` errors are retried; everything else propagates on the
//! first attempt. The wait before attempt `n` is derived from the attempt
//! index: `base · 2^(n-1)`, capped, stretched by a random jitter fraction.

use crate::error::{ReelvaultError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub attempts: u32,
    /// Wait before the second attempt; doubles per attempt after that.
    pub base_delay: Duration,
    /// Ceiling the doubling never exceeds.
    pub max_delay: Duration,
    /// Each wait is stretched by up to this fraction (0.0 disables).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Tight loop for adapter calls.
    pub fn quick() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            jitter: 0.25,
        }
    }

    /// Wait inserted after a failed attempt `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay);
        if self.jitter <= 0.0 {
            return raw;
        }
        use rand::Rng;
        let stretch = 1.0 + rand::thread_rng().gen::<f64>() * self.jitter;
        raw.mul_f64(stretch)
    }
}

/// Execute `operation`, retrying transient failures until the attempt
/// budget runs out.
pub async fn retry_with_backoff<F, Fut, T>(
    config: RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = config.attempts.max(1);
    loop {
        remaining -= 1;
        let attempt = config.attempts - remaining;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if remaining == 0 => {
                return Err(ReelvaultError::RetryExhausted {
                    operation: operation_name.to_string(),
                    attempts: config.attempts,
                    last_error: Box::new(err),
                })
            }
            Err(err) => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    remaining,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off: {}",
                    err
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> ReelvaultError {
        ReelvaultError::Transient {
            service: "test".to_string(),
            message: "boom".to_string(),
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(8),
            jitter: 0.0,
        }
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let config = fast();
        assert_eq!(config.delay_for(1), Duration::from_millis(1));
        assert_eq!(config.delay_for(2), Duration::from_millis(2));
        assert_eq!(config.delay_for(3), Duration::from_millis(4));
        // Capped from attempt 4 on.
        assert_eq!(config.delay_for(4), Duration::from_millis(8));
        assert_eq!(config.delay_for(40), Duration::from_millis(8));
    }

    #[test]
    fn jitter_only_stretches() {
        let config = RetryConfig {
            jitter: 0.5,
            ..fast()
        };
        for attempt in 1..=5 {
            let base = fast().delay_for(attempt);
            let jittered = config.delay_for(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base.mul_f64(1.5));
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_with_backoff(fast(), "test_op", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_with_backoff(fast(), "test_op", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ReelvaultError::Permanent {
                    service: "test".to_string(),
                    message: "bad credentials".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(ReelvaultError::Permanent { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_with_backoff(fast(), "test_op", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(ReelvaultError::RetryExhausted { attempts: 3, .. })
        ));
        // The whole budget was spent.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

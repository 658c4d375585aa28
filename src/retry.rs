//! Retry policy and exponential backoff helper.
//!
//! Opt-in: a node without a [`RetryConfig`] makes exactly one attempt per
//! call. When configured, only [`IpcError::TransportRetryable`](crate::IpcError::TransportRetryable)
//! failures are retried; every other error fails immediately. Delays grow
//! exponentially, capped at `max_delay`, with ±25% jitter so synchronized
//! clients do not retry in lockstep.

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy with exponential backoff.
///
/// Useful with broker-based transports where a responder may not yet be
/// subscribed when the first request is published.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial one (0 = single attempt).
    pub max_attempts: u32,

    /// Multiplier applied to the delay after each retry (2.0 doubles it).
    pub multiplier: f32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// 3 attempts, doubling from 100ms, capped at 5s.
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Run `operation`, retrying retryable failures per `retry_config`.
///
/// `None` executes the operation exactly once. Exhausting all attempts
/// surfaces the last retryable error to the caller.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    retry_config: Option<&RetryConfig>,
    mut operation: F,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let retry_config = match retry_config {
        Some(cfg) => cfg,
        None => return operation().await,
    };

    let mut attempt = 0;
    let mut current_delay = retry_config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(crate::IpcError::TransportRetryable(details)) => {
                attempt += 1;

                if attempt > retry_config.max_attempts {
                    crate::log_debug!(
                        "retry exhausted after {} attempts, last error: {}",
                        retry_config.max_attempts,
                        details
                    );
                    return Err(crate::IpcError::TransportRetryable(details));
                }

                let jittered_delay = apply_jitter(current_delay);

                crate::log_debug!(
                    "retry attempt {}/{}, waiting {:?} (error: {})",
                    attempt,
                    retry_config.max_attempts,
                    jittered_delay,
                    details
                );

                sleep(jittered_delay).await;

                current_delay = Duration::from_secs_f64(
                    current_delay.as_secs_f64() * retry_config.multiplier as f64,
                )
                .min(retry_config.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Multiplicative ±25% jitter: `delay * (0.75 + random(0.0..0.5))`.
///
/// Randomness comes from hashing the current time with a `RandomState`,
/// which keeps `rand` out of the dependency tree.
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    let random_state = RandomState::new();
    let hash = random_state.hash_one(std::time::SystemTime::now());

    let random_factor = (hash % 1000) as f64 / 1000.0;
    let jitter_multiplier = 0.75 + (random_factor * 0.5);

    Duration::from_secs_f64(delay.as_secs_f64() * jitter_multiplier)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::IpcError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn success_passes_through_without_retry() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let result = retry_with_backoff(Some(&RetryConfig::default()), || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, IpcError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn none_config_executes_once() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let result: crate::Result<u32> = retry_with_backoff(None, || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IpcError::TransportRetryable("down".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(IpcError::TransportRetryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        // ---
        let config = RetryConfig {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let result = retry_with_backoff(Some(&config), || {
            let calls = calls_in.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(IpcError::TransportRetryable("not yet".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        // ---
        let config = RetryConfig {
            max_attempts: 2,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let result: crate::Result<u32> = retry_with_backoff(Some(&config), || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IpcError::TransportRetryable("still down".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(IpcError::TransportRetryable(_))));
        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();

        let result: crate::Result<u32> = retry_with_backoff(Some(&RetryConfig::default()), || {
            let calls = calls_in.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(IpcError::Transport("hard failure".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(IpcError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn max_delay_caps_backoff() {
        // ---
        let config = RetryConfig {
            max_attempts: 5,
            multiplier: 10.0,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        };
        let start = Instant::now();

        let _result: crate::Result<u32> = retry_with_backoff(Some(&config), || async {
            Err(IpcError::TransportRetryable("test".into()))
        })
        .await;

        // 5 capped delays with jitter stay well under 400ms; an uncapped
        // 10x multiplier would blow far past it.
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_quarter_band() {
        // ---
        let delay = Duration::from_millis(100);

        for _ in 0..100 {
            let jittered = apply_jitter(delay);
            assert!(jittered >= Duration::from_millis(75), "too low: {jittered:?}");
            assert!(jittered <= Duration::from_millis(125), "too high: {jittered:?}");
        }
    }
}

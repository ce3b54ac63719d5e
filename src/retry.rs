//! Bounded retry with exponential backoff and jitter
//!
//! Every remote step of a launch (lookup table create/extend, distribution,
//! sells, sweeps, re-broadcasts) runs through [`retry_with_policy`]. A step is
//! retried only while its error reports [`Retryable::is_retryable`]; the
//! policy decides whether running out of attempts aborts the caller
//! ([`OnExhaustion::Fatal`]) or lets it continue without a result
//! ([`OnExhaustion::Skippable`]).

use crate::config::RetryConfig;
use crate::metrics::metrics;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::rpc_manager::RpcManagerError {
    fn is_retryable(&self) -> bool {
        crate::rpc_manager::RpcManagerError::is_retryable(self)
    }
}

impl Retryable for crate::tx_builder::TransactionBuilderError {
    fn is_retryable(&self) -> bool {
        crate::tx_builder::TransactionBuilderError::is_retryable(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExhaustion {
    /// Surface the last error to the caller
    Fatal,
    /// Log and continue with no result
    Skippable,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub on_exhaustion: OnExhaustion,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 5_000,
            on_exhaustion: OnExhaustion::Fatal,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, on_exhaustion: OnExhaustion) -> Self {
        Self {
            max_attempts,
            on_exhaustion,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        self.base_backoff_ms = base_backoff_ms;
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    fn from_config(config: &RetryConfig, attempts: u32, on_exhaustion: OnExhaustion) -> Self {
        Self::new(attempts, on_exhaustion).with_backoff(config.base_backoff_ms, config.max_backoff_ms)
    }

    /// Lookup table create and each extension step
    pub fn lookup_table(config: &RetryConfig) -> Self {
        Self::from_config(config, config.lookup_table_attempts, OnExhaustion::Fatal)
    }

    /// The single multi-transfer funding transaction
    pub fn distribution(config: &RetryConfig) -> Self {
        Self::from_config(config, config.distribution_attempts, OnExhaustion::Fatal)
    }

    /// Token sell during a sweep; an unsold balance is still transferred home
    pub fn recovery_sell(config: &RetryConfig) -> Self {
        Self::from_config(config, config.sell_attempts, OnExhaustion::Skippable)
    }

    /// Transfer/close/sweep transaction for one wallet
    pub fn recovery_sweep(config: &RetryConfig) -> Self {
        Self::from_config(config, config.recovery_attempts, OnExhaustion::Fatal)
    }

    /// Re-broadcast of already signed bytes
    pub fn broadcast(config: &RetryConfig) -> Self {
        Self::from_config(config, config.broadcast_attempts, OnExhaustion::Fatal)
    }

    /// Delay schedule between attempts: doubling from `base_backoff_ms`,
    /// capped at `max_backoff_ms`, with full jitter
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor(self.base_backoff_ms / 2)
            .max_delay(Duration::from_millis(self.max_backoff_ms))
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

enum Stopped<E> {
    Permanent(E),
    Exhausted(E),
}

async fn run_attempts<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, Stopped<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays();
    let mut attempt = 1;

    loop {
        if attempt > 1 {
            metrics().retries_total.inc();
            debug!(
                operation = operation_name,
                attempt,
                max_attempts,
                "Retrying operation"
            );
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "Permanent error, not retrying"
                    );
                    return Err(Stopped::Permanent(err));
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "All retry attempts exhausted"
                    );
                    return Err(Stopped::Exhausted(err));
                }

                let backoff = delays.next().unwrap_or_default();
                debug!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Transient error, backing off before retry"
                );
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Run `operation` under `policy`
///
/// The closure receives the 1-based attempt number. Returns `Ok(Some(_))` on
/// success; on a permanent error or exhaustion a `Fatal` policy returns the
/// last error and a `Skippable` policy returns `Ok(None)`.
pub async fn retry_with_policy<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    match run_attempts(operation_name, policy, operation).await {
        Ok(value) => Ok(Some(value)),
        Err(Stopped::Permanent(err)) | Err(Stopped::Exhausted(err)) => match policy.on_exhaustion {
            OnExhaustion::Fatal => Err(err),
            OnExhaustion::Skippable => {
                warn!(operation = operation_name, error = %err, "Skipping operation");
                Ok(None)
            }
        },
    }
}

/// [`retry_with_policy`] for steps whose result the caller cannot do without
///
/// Always surfaces the last error, whatever the policy's exhaustion mode.
pub async fn retry_required<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    run_attempts(operation_name, policy, operation)
        .await
        .map_err(|stopped| match stopped {
            Stopped::Permanent(err) | Stopped::Exhausted(err) => err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    fn fast(max_attempts: u32, on_exhaustion: OnExhaustion) -> RetryPolicy {
        RetryPolicy::new(max_attempts, on_exhaustion).with_backoff(0, 0)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_required("op", &fast(5, OnExhaustion::Fatal), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(TestError { transient: true })
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
    async fn test_fatal_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<()>, _> =
            retry_with_policy("op", &fast(5, OnExhaustion::Fatal), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: true }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_skippable_exhaustion_yields_none() {
        let result: Result<Option<()>, TestError> =
            retry_with_policy("op", &fast(10, OnExhaustion::Skippable), |_| async {
                Err(TestError { transient: true })
            })
            .await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_permanent_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_required("op", &fast(6, OnExhaustion::Fatal), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { transient: false }) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_schedule_is_bounded() {
        let policy = RetryPolicy::new(6, OnExhaustion::Fatal).with_backoff(200, 1_000);
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(1_000)));
    }

    #[test]
    fn test_policies_follow_config() {
        let config = RetryConfig::default();
        assert_eq!(RetryPolicy::lookup_table(&config).max_attempts, 5);
        assert_eq!(RetryPolicy::distribution(&config).max_attempts, 6);
        let sell = RetryPolicy::recovery_sell(&config);
        assert_eq!(sell.max_attempts, 10);
        assert_eq!(sell.on_exhaustion, OnExhaustion::Skippable);
    }
}

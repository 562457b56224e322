use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use casegraph_core::config::RetryPolicy;
use casegraph_core::error::{CaseGraphError, Result};

tokio::task_local! {
    static RUN_ABORT: CancellationToken;
}

/// Run `fut` with `abort` as its run-wide stop signal. Once `abort` is
/// cancelled, [`retry`] calls inside `fut` start no further attempts.
pub async fn with_abort<F: Future>(abort: CancellationToken, fut: F) -> F::Output {
    RUN_ABORT.scope(abort, fut).await
}

fn abort_signal() -> Option<CancellationToken> {
    RUN_ABORT.try_with(CancellationToken::clone).ok()
}

/// Run `op` under `policy`, sleeping with exponential backoff between attempts.
///
/// Fatal errors (see [`CaseGraphError::is_retryable`]) are returned as-is on
/// first sight. Once the retry budget is spent the last failure is wrapped in
/// `ExhaustedRetries`; the caller never gets a default value.
///
/// Inside [`with_abort`], an aborted run ends the loop after the attempt in
/// flight: the last failure is returned unwrapped and no backoff is slept.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    let abort = abort_signal();
    let aborted = || abort.as_ref().is_some_and(CancellationToken::is_cancelled);

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if aborted() {
                    debug!(operation, attempts = attempt + 1, "Run aborted, not retrying");
                    return Err(e);
                }
                if attempt >= policy.max_attempts {
                    warn!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return Err(CaseGraphError::ExhaustedRetries {
                        operation: operation.to_string(),
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }

                let backoff = backoff_delay(policy, attempt, rand::random::<f64>());
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = policy.total_calls(),
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                match &abort {
                    Some(token) => {
                        tokio::select! {
                            _ = token.cancelled() => {
                                debug!(operation, attempts = attempt + 1, "Run aborted during backoff");
                                return Err(e);
                            }
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                    None => tokio::time::sleep(backoff).await,
                }
                attempt += 1;
            }
        }
    }
}

/// Delay before the `retry_index`-th retry (0-indexed).
///
/// `min(base * 2^i, max)` scaled by `1 + jitter_sample * jitter_fraction`,
/// where `jitter_sample` is drawn from `[0, 1)`.
pub fn backoff_delay(policy: &RetryPolicy, retry_index: u32, jitter_sample: f64) -> Duration {
    let factor = 2u64.checked_pow(retry_index).unwrap_or(u64::MAX);
    let ms = policy
        .base_delay_ms
        .saturating_mul(factor)
        .min(policy.max_delay_ms);
    let fraction = if policy.jitter_fraction.is_finite() {
        policy.jitter_fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let jitter = 1.0 + jitter_sample.clamp(0.0, 1.0) * fraction;
    Duration::try_from_secs_f64(Duration::from_millis(ms).as_secs_f64() * jitter)
        .unwrap_or_else(|_| policy.max_delay())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_delays(Duration::from_millis(100), Duration::from_millis(1_000))
    }

    fn flaky(calls: Arc<AtomicU32>, failures: u32) -> impl FnMut() -> futures::future::BoxFuture<'static, Result<&'static str>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(CaseGraphError::transient("inference", format!("HTTP 503 #{n}")))
                } else {
                    Ok("done")
                }
            })
        }
    }

    #[test]
    fn test_backoff_bounds() {
        let p = policy(5);
        assert_eq!(backoff_delay(&p, 0, 0.0), Duration::from_millis(100));
        assert_eq!(backoff_delay(&p, 2, 0.0), Duration::from_millis(400));
        // capped at max_delay
        assert_eq!(backoff_delay(&p, 6, 0.0), Duration::from_millis(1_000));

        let high = backoff_delay(&p, 1, 0.999_999);
        assert!(high >= Duration::from_millis(200));
        assert!(high < Duration::from_millis(220));

        let capped = backoff_delay(&p, 10, 0.999_999);
        assert!(capped < Duration::from_millis(1_100));
    }

    #[test]
    fn test_backoff_huge_index_does_not_overflow() {
        let p = policy(5);
        assert_eq!(backoff_delay(&p, 200, 0.0), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_out_of_range_jitter() {
        let mut p = policy(5);
        p.jitter_fraction = 1e30;
        let clamped = backoff_delay(&p, 0, 0.5);
        assert!(clamped >= Duration::from_micros(149_900));
        assert!(clamped <= Duration::from_micros(150_100));
        p.jitter_fraction = f64::NAN;
        assert_eq!(backoff_delay(&p, 0, 0.5), Duration::from_millis(100));

        let huge = RetryPolicy {
            base_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
            jitter_fraction: 1.0,
            ..RetryPolicy::default()
        };
        assert!(backoff_delay(&huge, 0, 0.999) >= Duration::from_millis(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_further_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let abort = CancellationToken::new();
        let trip = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trip.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = with_abort(abort, retry(&policy(5), "map", flaky(calls.clone(), u32::MAX)))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CaseGraphError::TransientService { .. }));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_aborted_run_skips_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let abort = CancellationToken::new();
        abort.cancel();
        let err = with_abort(abort, retry(&policy(5), "map", flaky(calls.clone(), u32::MAX)))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!matches!(err, CaseGraphError::ExhaustedRetries { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = policy(5);

        let start = tokio::time::Instant::now();
        let value = retry(&p, "extract", flaky(calls.clone(), 3)).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 ms, each stretched by at most 10% (plus timer rounding)
        assert!(elapsed >= Duration::from_millis(700));
        assert!(elapsed <= Duration::from_millis(775));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let p = policy(3);

        let err = retry(&p, "extract", flaky(calls.clone(), u32::MAX))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            CaseGraphError::ExhaustedRetries {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "extract");
                assert_eq!(attempts, 4);
                assert!(last.to_string().contains("#3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = retry(&policy(5), "translate", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(CaseGraphError::Fatal("malformed input".into()))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CaseGraphError::Fatal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_wraps_first_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = retry(&RetryPolicy::none(), "search", flaky(calls.clone(), 1))
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CaseGraphError::ExhaustedRetries { attempts: 1, .. }));
    }
}

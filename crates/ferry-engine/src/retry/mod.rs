//! Retrying fallible work with bounded attempts and bounded backoff.
//!
//! [`execute_with_retry`] runs the work on the calling thread.
//! [`async_execute_with_retry`] runs every attempt on a [`RetryPool`]
//! thread and gives up on attempts that do not finish in time.

use crate::SyncError;
use crossbeam::channel::{bounded, RecvTimeoutError};
use ferry_types::error::{Classify, ErrorKind};
use std::{
    collections::BTreeSet,
    fmt::Display,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub mod pool;

pub use pool::RetryPool;

/// Upper bound on a single backoff sleep.
pub const MAX_SLEEP: Duration = Duration::from_secs(256);

/// How many times to try, how long to wait in between, and which failures
/// are worth another try.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    retry_times: u32,
    sleep: Duration,
    exponential: bool,
    retryable: BTreeSet<ErrorKind>,
}

impl RetryPolicy {
    /// Policy that makes up to `retry_times` attempts in total, sleeping
    /// `sleep` between attempts.  Every error kind is retried.
    pub fn new(retry_times: u32, sleep: Duration) -> Result<Self, SyncError> {
        if retry_times < 1 {
            return Err(SyncError::invalid_argument(format!(
                "retry times must be at least 1, got {retry_times}"
            )));
        }
        Ok(Self {
            retry_times,
            sleep,
            exponential: false,
            retryable: BTreeSet::new(),
        })
    }

    /// Doubles the sleep after every failed attempt.
    pub fn exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Only retries failures of the given kinds; any other failure is
    /// returned immediately.  An empty set retries everything.
    pub fn retry_on<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = ErrorKind>,
    {
        self.retryable = kinds.into_iter().collect();
        self
    }

    pub fn retry_times(&self) -> u32 {
        self.retry_times
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.is_empty() || self.retryable.contains(&kind)
    }

    /// Sleep after the failure of attempt `failed_index` (0-based).
    pub fn backoff(&self, failed_index: u32) -> Duration {
        backoff_delay(self.sleep, failed_index, self.exponential)
    }
}

/// `sleep`, or `sleep * 2^failed_index` if `exponential`, capped at
/// [`MAX_SLEEP`].  A zero `sleep` never sleeps.
pub fn backoff_delay(sleep: Duration, failed_index: u32, exponential: bool) -> Duration {
    if sleep.is_zero() {
        return Duration::ZERO;
    }
    let delay = if exponential {
        2u32.checked_pow(failed_index)
            .and_then(|factor| sleep.checked_mul(factor))
            .unwrap_or(MAX_SLEEP)
    } else {
        sleep
    };
    delay.min(MAX_SLEEP)
}

/// Calls `work` until it succeeds, it fails with an error that `policy`
/// does not retry, or `policy.retry_times()` attempts have failed.
///
/// Returns the result of the first successful attempt, or the error of the
/// last failed one.
pub fn execute_with_retry<T, E, F>(mut work: F, policy: &RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Classify + Display,
{
    let mut failed = 0;
    loop {
        let error = match work() {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if failed == 0 {
            error!("attempt failed: {error}");
        }
        if !policy.is_retryable(error.kind()) {
            return Err(error);
        }

        failed += 1;
        if failed >= policy.retry_times {
            return Err(error);
        }

        let delay = policy.backoff(failed - 1);
        if !delay.is_zero() {
            warn!(
                "attempt {failed}/{} failed ({error}); retrying in {} ms",
                policy.retry_times,
                delay.as_millis()
            );
            let start = Instant::now();
            thread::sleep(delay);
            warn!(
                "slept {} ms, starting attempt {}",
                start.elapsed().as_millis(),
                failed + 1
            );
        }
    }
}

/// Like [`execute_with_retry`], but every attempt runs on a `pool` thread
/// and fails with [`SyncError::AttemptTimeout`] unless it finishes within
/// `timeout`.
///
/// `work` receives a token that is cancelled once its attempt is over,
/// whatever the outcome.  Long-running work should check the token and
/// return early: an attempt that ignores it keeps its pool thread busy
/// after the retry loop has moved on.
///
/// An attempt the pool has no thread for fails with
/// [`SyncError::AttemptRejected`]; one that panics fails with
/// [`SyncError::AttemptAbandoned`].  Both count as failed attempts.
pub fn async_execute_with_retry<T, E, F>(
    work: F,
    policy: &RetryPolicy,
    timeout: Duration,
    pool: &RetryPool,
) -> Result<T, E>
where
    F: Fn(CancellationToken) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Classify + Display + From<SyncError> + Send + 'static,
{
    let work = Arc::new(work);
    execute_with_retry(|| run_with_timeout(&work, timeout, pool), policy)
}

fn run_with_timeout<T, E, F>(work: &Arc<F>, timeout: Duration, pool: &RetryPool) -> Result<T, E>
where
    F: Fn(CancellationToken) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: From<SyncError> + Send + 'static,
{
    let (sender, receiver) = bounded(1);
    let token = CancellationToken::new();

    let job = {
        let work = work.clone();
        let token = token.clone();
        move || {
            if !token.is_cancelled() {
                let _ = sender.send(work(token));
            }
        }
    };
    pool.execute(job)?;

    let result = match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "attempt did not finish within {} ms, cancelling it ({} retry threads busy)",
                timeout.as_millis(),
                pool.active_count()
            );
            Err(SyncError::AttemptTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }
            .into())
        }
        Err(RecvTimeoutError::Disconnected) => Err(SyncError::AttemptAbandoned.into()),
    };
    token.cancel();
    result
}

#[cfg(test)]
mod test {
    use super::{
        async_execute_with_retry, backoff_delay, execute_with_retry, RetryPolicy, RetryPool,
        MAX_SLEEP,
    };
    use crate::{test::init_test_logger, SyncError};
    use crossbeam::channel::bounded;
    use ferry_types::error::ErrorKind;
    use std::{
        cell::Cell,
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        thread::sleep,
        time::{Duration, Instant},
    };
    use tokio_util::sync::CancellationToken;

    #[test]
    fn backoff_is_capped() {
        let sleep = Duration::from_secs(1);
        for i in 1..5u32 {
            assert_eq!(
                backoff_delay(sleep, i - 1, true),
                Duration::from_millis(1000 * 2u64.pow(i - 1)).min(MAX_SLEEP)
            );
        }
        assert_eq!(backoff_delay(sleep, 8, true), MAX_SLEEP);
        assert_eq!(backoff_delay(sleep, 20, true), MAX_SLEEP);
        assert_eq!(backoff_delay(sleep, 100, true), MAX_SLEEP);
        assert_eq!(backoff_delay(sleep, 3, false), sleep);
        assert_eq!(backoff_delay(Duration::ZERO, 32, true), Duration::ZERO);
        assert_eq!(backoff_delay(Duration::ZERO, 100, true), Duration::ZERO);
        assert_eq!(backoff_delay(Duration::ZERO, 0, false), Duration::ZERO);
        assert_eq!(
            backoff_delay(Duration::from_secs(300), 0, false),
            MAX_SLEEP
        );
    }

    #[test]
    fn zero_retry_times_is_rejected() {
        let error = RetryPolicy::new(0, Duration::ZERO).unwrap_err();
        assert!(matches!(error, SyncError::InvalidArgument { .. }));
    }

    #[test]
    fn exhausted_retries_return_last_error() {
        init_test_logger();
        let calls = Cell::new(0u64);
        let policy = RetryPolicy::new(3, Duration::from_millis(10)).unwrap();

        let result: Result<(), SyncError> = execute_with_retry(
            || {
                calls.set(calls.get() + 1);
                Err(SyncError::AttemptTimeout {
                    timeout_ms: calls.get(),
                })
            },
            &policy,
        );

        assert_eq!(calls.get(), 3);
        assert!(matches!(
            result,
            Err(SyncError::AttemptTimeout { timeout_ms: 3 })
        ));
    }

    #[test]
    fn non_retryable_error_fails_fast() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(10))
            .unwrap()
            .retry_on([ErrorKind::ChannelClosed]);

        let start = Instant::now();
        let result: Result<(), SyncError> = execute_with_retry(
            || {
                calls.set(calls.get() + 1);
                Err(SyncError::invalid_argument("bad input"))
            },
            &policy,
        );

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(SyncError::InvalidArgument { .. })));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn transient_failure_then_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(4, Duration::from_millis(1))
            .unwrap()
            .exponential(true)
            .retry_on([ErrorKind::ChannelClosed]);

        let result = execute_with_retry(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(SyncError::ChannelClosed)
                } else {
                    Ok("done")
                }
            },
            &policy,
        );

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn async_attempts_time_out() {
        init_test_logger();
        let pool = RetryPool::new("test-retry", 2, Duration::from_secs(1));
        let policy = RetryPolicy::new(2, Duration::from_millis(10)).unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let result: Result<(), SyncError> = async_execute_with_retry(
            {
                let calls = calls.clone();
                move |token: CancellationToken| {
                    calls.fetch_add(1, Ordering::AcqRel);
                    let deadline = Instant::now() + Duration::from_millis(500);
                    while Instant::now() < deadline {
                        if token.is_cancelled() {
                            return Err(SyncError::AttemptAbandoned);
                        }
                        sleep(Duration::from_millis(5));
                    }
                    Ok(())
                }
            },
            &policy,
            Duration::from_millis(50),
            &pool,
        );

        assert!(matches!(
            result,
            Err(SyncError::AttemptTimeout { timeout_ms: 50 })
        ));
        assert_eq!(calls.load(Ordering::Acquire), 2);
        assert!(start.elapsed() < Duration::from_millis(450));
    }

    #[test]
    fn async_success() {
        let pool = RetryPool::for_retries();
        let policy = RetryPolicy::new(3, Duration::from_millis(1)).unwrap();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<u32, SyncError> = async_execute_with_retry(
            {
                let calls = calls.clone();
                move |_token| {
                    let call = calls.fetch_add(1, Ordering::AcqRel) + 1;
                    if call == 1 {
                        Err(SyncError::ChannelClosed)
                    } else {
                        Ok(call)
                    }
                }
            },
            &policy,
            Duration::from_secs(5),
            &pool,
        );

        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn async_panic_and_rejection() {
        let policy = RetryPolicy::new(1, Duration::ZERO).unwrap();

        let pool = RetryPool::new("test-retry", 1, Duration::from_secs(1));
        let result: Result<(), SyncError> = async_execute_with_retry(
            |_token| panic!("plugin bug"),
            &policy,
            Duration::from_secs(5),
            &pool,
        );
        assert!(matches!(result, Err(SyncError::AttemptAbandoned)));

        let busy = RetryPool::new("test-busy", 1, Duration::from_secs(10));
        let (release_tx, release_rx) = bounded::<()>(0);
        busy.execute(move || {
            let _ = release_rx.recv();
        })
        .unwrap();
        crate::test::wait(|| busy.active_count() == 1, 5_000).unwrap();

        let result: Result<(), SyncError> =
            async_execute_with_retry(|_token| Ok(()), &policy, Duration::from_secs(5), &busy);
        assert!(matches!(
            result,
            Err(SyncError::AttemptRejected { max_threads: 1 })
        ));
        release_tx.send(()).unwrap();
    }
}

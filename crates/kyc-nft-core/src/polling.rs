//! Bounded, strictly sequential retry of an asynchronous operation.
//!
//! [`poll`] keeps calling an operation until its result is accepted by the
//! resolve predicate, an error the retry predicate rejects is raised, or the
//! retry budget runs out. Everything that waits on a chain builds on this.

use std::{fmt::Debug, time::Duration};

use bon::Builder;

use crate::types::BoxError;

pub type Predicate<V> = Box<dyn Fn(&V) -> bool + Send + Sync>;

/// Options for [`poll`].
#[derive(Builder)]
pub struct PollOptions<T, E> {
    /// Whether a successful result is final. Defaults to always.
    pub resolve_predicate: Option<Predicate<T>>,
    /// Whether an error may be retried. Defaults to never.
    pub retry_on_error_predicate: Option<Predicate<E>>,
    /// Double the delay after each retry instead of keeping it fixed.
    #[builder(default)]
    pub use_exponential_backoff: bool,
}

impl<T, E> Default for PollOptions<T, E> {
    fn default() -> Self {
        PollOptions {
            resolve_predicate: None,
            retry_on_error_predicate: None,
            use_exponential_backoff: false,
        }
    }
}

impl<T, E> PollOptions<T, E> {
    fn resolves(&self, value: &T) -> bool {
        self.resolve_predicate.as_ref().is_none_or(|p| p(value))
    }

    fn retries(&self, error: &E) -> bool {
        self.retry_on_error_predicate.as_ref().is_some_and(|p| p(error))
    }

    /// Delay before the retry with 0-based index `retry`.
    pub fn delay(&self, initial_delay: Duration, retry: u32) -> Duration {
        if self.use_exponential_backoff {
            initial_delay.saturating_mul(2u32.saturating_pow(retry))
        } else {
            initial_delay
        }
    }
}

/// Raised when the retry budget is exhausted.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TimeOutError {
    /// Always `"TIMEOUT"`.
    pub message: &'static str,
    /// The last retryable error, if the last attempt failed.
    #[source]
    pub wrapped_error: Option<BoxError>,
    /// Debug rendering of the last unaccepted result, if the last attempt succeeded.
    pub last_result: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("{0}")]
    TimeOut(#[source] TimeOutError),
    #[error(transparent)]
    Operation(E),
}

impl<E> PollError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::TimeOut(_))
    }
}

/// Run `operation` until it resolves, fails fatally, or `max_retries` retries
/// after the first attempt are used up.
///
/// The first attempt starts immediately. Each retry waits for the delay given
/// by [`PollOptions::delay`] after the previous attempt settled.
pub async fn poll<T, E, F, Fut>(
    mut operation: F,
    initial_delay: Duration,
    max_retries: u32,
    options: PollOptions<T, E>,
) -> Result<T, PollError<E>>
where
    T: Debug,
    E: Into<BoxError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let (wrapped_error, last_result) = match operation().await {
            Ok(value) if options.resolves(&value) => return Ok(value),
            Ok(value) => (None, Some(format!("{value:?}"))),
            Err(err) if options.retries(&err) => (Some(err), None),
            Err(err) => return Err(PollError::Operation(err)),
        };

        let retry = attempts - 1;
        if retry >= max_retries {
            #[cfg(feature = "tracing")]
            tracing::debug!("Polling gave up after {attempts} attempts");

            return Err(PollError::TimeOut(TimeOutError {
                message: "TIMEOUT",
                wrapped_error: wrapped_error.map(Into::into),
                last_result,
                attempts,
            }));
        }

        tokio::time::sleep(options.delay(initial_delay, retry)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use tokio::time::Instant;

    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        let c = Arc::new(AtomicU32::new(0));
        (c.clone(), c)
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_first_attempt_without_delay() {
        let (calls, seen) = counter();
        let started = Instant::now();

        let value = poll(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(42) }
            },
            Duration::from_secs(5),
            10,
            PollOptions::builder()
                .resolve_predicate(Box::new(|v: &i32| *v == 42))
                .build(),
        )
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_retries_plus_one_attempts() {
        let (calls, seen) = counter();

        let err = poll(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>("pending") }
            },
            Duration::from_millis(100),
            3,
            PollOptions::builder()
                .resolve_predicate(Box::new(|v: &&str| *v == "done"))
                .build(),
        )
        .await
        .unwrap_err();

        assert_eq!(seen.load(Ordering::SeqCst), 4);
        match err {
            PollError::TimeOut(t) => {
                assert_eq!(t.message, "TIMEOUT");
                assert_eq!(t.attempts, 4);
                assert!(t.wrapped_error.is_none());
                assert_eq!(t.last_result.as_deref(), Some("\"pending\""));
            }
            PollError::Operation(_) => panic!("expected timeout"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_propagates_immediately() {
        let (calls, seen) = counter();

        let err = poll(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u8, _>(TestError("boom")) }
            },
            Duration::from_secs(1),
            50,
            PollOptions::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(matches!(err, PollError::Operation(TestError("boom"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_then_success() {
        let (calls, seen) = counter();
        let started = Instant::now();

        let value = poll(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError("not yet"))
                    } else {
                        Ok(n)
                    }
                }
            },
            Duration::from_secs(2),
            5,
            PollOptions::builder()
                .retry_on_error_predicate(Box::new(|e: &TestError| e.0 == "not yet"))
                .build(),
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wraps_last_retryable_error() {
        let err = poll(
            || async { Err::<(), _>(TestError("not yet")) },
            Duration::from_millis(10),
            2,
            PollOptions::builder()
                .retry_on_error_predicate(Box::new(|_: &TestError| true))
                .build(),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        match err {
            PollError::TimeOut(t) => {
                let last = t.wrapped_error.unwrap();
                assert_eq!(last.downcast_ref::<TestError>(), Some(&TestError("not yet")));
            }
            PollError::Operation(_) => panic!("expected timeout"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_schedule() {
        let started = Instant::now();

        let _ = poll(
            || async { Ok::<_, TestError>(0) },
            Duration::from_secs(1),
            3,
            PollOptions::builder()
                .resolve_predicate(Box::new(|_: &i32| false))
                .use_exponential_backoff(true)
                .build(),
        )
        .await;

        // 1 + 2 + 4
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[test]
    fn test_linear_delay_is_constant() {
        let options = PollOptions::<(), ()>::default();
        assert_eq!(
            options.delay(Duration::from_secs(3), 7),
            Duration::from_secs(3)
        );
    }
}

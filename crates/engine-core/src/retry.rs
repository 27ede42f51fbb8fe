use engine_config::settings::RetrySettings;
use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::sleep;
use tracing::warn;

/// Whether a failed call is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was classified as fatal on the first occurrence.
    Fatal(E),
    /// Every attempt failed with a retryable error; holds the last one.
    AttemptsExceeded(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) | RetryError::AttemptsExceeded(e) => e,
        }
    }
}

/// Bounded retries with exponential backoff, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::new(
            settings.max_attempts,
            settings.base_delay,
            settings.max_delay,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Runs `op` until it succeeds, `classify` says stop, or attempts run out.
    pub async fn run<F, Fut, T, E, C>(
        &self,
        label: &str,
        mut op: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryDisposition,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if classify(&err) == RetryDisposition::Stop {
                return Err(RetryError::Fatal(err));
            }
            if attempt + 1 >= self.max_attempts {
                return Err(RetryError::AttemptsExceeded(err));
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                call = label,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(10);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicUsize::new(0);
        let result = fast(3)
            .run(
                "test",
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("busy")
                    } else {
                        Ok(42)
                    }
                },
                |_| RetryDisposition::Retry,
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_stop_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast(5)
            .run(
                "test",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("bad request")
                },
                |_| RetryDisposition::Stop,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Fatal("bad request"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let result: Result<(), _> = fast(2)
            .run("test", || async { Err("busy") }, |_| RetryDisposition::Retry)
            .await;
        assert!(matches!(result, Err(RetryError::AttemptsExceeded("busy"))));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(200), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(800));
        assert_eq!(policy.backoff_delay(8), Duration::from_secs(5));
    }
}

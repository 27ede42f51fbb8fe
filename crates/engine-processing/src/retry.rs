use crate::error::StepError;
use connectors::error::SourceError;
use engine_core::retry::{RetryDisposition, RetryPolicy};
use std::future::Future;

pub fn classify_source_error(err: &SourceError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

/// Runs a remote call under `policy`, retrying transient source errors.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, StepError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    policy
        .run(label, op, classify_source_error)
        .await
        .map_err(|e| StepError::Source(e.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    fn api(status: u16) -> SourceError {
        SourceError::Api {
            status,
            code: "CODE".into(),
            message: "message".into(),
        }
    }

    #[tokio::test]
    async fn retries_only_transient_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1));

        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&policy, "count", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(api(503))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(&policy, "count", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(api(400))
        })
        .await;
        assert!(matches!(result, Err(StepError::Source(SourceError::Api { status: 400, .. }))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

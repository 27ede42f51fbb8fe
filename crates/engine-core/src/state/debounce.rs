use crate::error::StateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// In-memory value whose on-disk copy may lag behind.
#[derive(Debug)]
pub(crate) struct Tracked<T> {
    pub value: T,
    dirty: bool,
    last_write: Option<DateTime<Utc>>,
    writes: u64,
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Tracked {
            value,
            dirty: false,
            last_write: None,
            writes: 0,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_written(&mut self) {
        self.dirty = false;
        self.last_write = Some(Utc::now());
        self.writes += 1;
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        self.last_write
    }
}

#[async_trait]
pub(crate) trait Flush: Send + Sync + 'static {
    const NAME: &'static str;

    /// Persists pending changes. Without `force` nothing is written unless
    /// the value changed since the last write. Returns whether a write happened.
    async fn flush(&self, force: bool) -> Result<bool, StateError>;
}

/// Background task flushing a target on a fixed interval.
pub(crate) struct Debouncer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Debouncer {
    pub fn spawn<F: Flush>(target: Arc<F>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match target.flush(false).await {
                            Ok(true) => debug!(logger = F::NAME, "Flushed pending changes"),
                            Ok(false) => {}
                            Err(e) => warn!(logger = F::NAME, error = %e, "Periodic flush failed"),
                        }
                    }
                }
            }
        });

        Debouncer { cancel, handle }
    }

    /// Cancels the task and waits until an in-progress flush has finished.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Flush task ended abnormally");
        }
    }
}

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct Counters {
    records_read: AtomicU64,
    records_masked: AtomicU64,
    batches_submitted: AtomicU64,
    bytes_submitted: AtomicU64,
    records_failed: AtomicU64,
}

/// Throughput counters of one object step, shared between its pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct StepMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepMetricsSnapshot {
    pub records_read: u64,
    pub records_masked: u64,
    pub batches_submitted: u64,
    pub bytes_submitted: u64,
    pub records_failed: u64,
}

impl StepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        self.inner.records_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_masked(&self) {
        self.inner.records_masked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_submitted(&self, bytes: usize) {
        self.inner.batches_submitted.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_submitted
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn records_failed(&self, count: u64) {
        self.inner.records_failed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StepMetricsSnapshot {
        StepMetricsSnapshot {
            records_read: self.inner.records_read.load(Ordering::Relaxed),
            records_masked: self.inner.records_masked.load(Ordering::Relaxed),
            batches_submitted: self.inner.batches_submitted.load(Ordering::Relaxed),
            bytes_submitted: self.inner.bytes_submitted.load(Ordering::Relaxed),
            records_failed: self.inner.records_failed.load(Ordering::Relaxed),
        }
    }
}

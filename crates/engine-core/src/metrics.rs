use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    pages_drained: AtomicU64,
    rows_returned: AtomicU64,
    bytes_drained: AtomicU64,
    batches_served: AtomicU64,
    replays: AtomicU64,
    decode_failures: AtomicU64,
}

/// Counters for one result cursor. Cloning shares the counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub pages_drained: u64,
    pub rows_returned: u64,
    pub bytes_drained: u64,
    pub batches_served: u64,
    pub replays: u64,
    pub decode_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_pages(&self, count: u64) {
        self.inner.pages_drained.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_rows(&self, count: u64) {
        self.inner.rows_returned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_bytes(&self, count: u64) {
        self.inner.bytes_drained.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_batches(&self, count: u64) {
        self.inner.batches_served.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_replays(&self, count: u64) {
        self.inner.replays.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_decode_failures(&self, count: u64) {
        self.inner
            .decode_failures
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_drained: self.inner.pages_drained.load(Ordering::Relaxed),
            rows_returned: self.inner.rows_returned.load(Ordering::Relaxed),
            bytes_drained: self.inner.bytes_drained.load(Ordering::Relaxed),
            batches_served: self.inner.batches_served.load(Ordering::Relaxed),
            replays: self.inner.replays.load(Ordering::Relaxed),
            decode_failures: self.inner.decode_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

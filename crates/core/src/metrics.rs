use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Counters tracking frame flow through a pipeline.
///
/// Shared between the producer callback and the consumer; all updates are
/// relaxed atomics so neither side ever contends on them. Cloning yields a
/// handle onto the same counters.
///
/// # Example
/// ```rust
/// use ocular_core::prelude::CaptureMetrics;
///
/// let metrics = CaptureMetrics::default();
/// metrics.record_queued();
/// metrics.record_recycled();
/// let snap = metrics.snapshot();
/// assert_eq!(snap.queued, 1);
/// assert_eq!(snap.recycled, 1);
/// ```
#[derive(Clone, Default)]
pub struct CaptureMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    queued: AtomicU64,
    recycled: AtomicU64,
    delivered: AtomicU64,
    discarded_empty: AtomicU64,
    starved: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Frames accepted into the frame queue.
    pub queued: u64,
    /// Filled frames dropped back into the pool because the queue was full.
    pub recycled: u64,
    /// Frames handed to the consumer.
    pub delivered: u64,
    /// Zero-length hardware buffers returned without queueing.
    pub discarded_empty: u64,
    /// Refill attempts that found the pool empty.
    pub starved: u64,
}

impl CaptureMetrics {
    pub fn record_queued(&self) {
        self.inner.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recycled(&self) {
        self.inner.recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_empty(&self) {
        self.inner.discarded_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_starved(&self) {
        self.inner.starved.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out every counter at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queued: self.inner.queued.load(Ordering::Relaxed),
            recycled: self.inner.recycled.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            discarded_empty: self.inner.discarded_empty.load(Ordering::Relaxed),
            starved: self.inner.starved.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CaptureMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("CaptureMetrics")
            .field("queued", &snap.queued)
            .field("recycled", &snap.recycled)
            .field("delivered", &snap.delivered)
            .field("discarded_empty", &snap.discarded_empty)
            .field("starved", &snap.starved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let metrics = CaptureMetrics::default();
        let handle = metrics.clone();
        handle.record_queued();
        handle.record_queued();
        metrics.record_recycled();
        let snap = metrics.snapshot();
        assert_eq!(snap.queued, 2);
        assert_eq!(snap.recycled, 1);
        assert_eq!(handle.snapshot(), snap);
    }
}

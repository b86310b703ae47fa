use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a delivery loop.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    acked: AtomicU64,
    failed: AtomicU64,
    stream_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub acked: u64,
    pub failed: u64,
    pub stream_errors: u64,
}

impl DeliveryStats {
    pub(crate) fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acked: self.acked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
        }
    }
}

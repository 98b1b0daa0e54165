use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe operation counters.
///
/// Producer-side and consumer-side counters are padded onto separate cache
/// lines so that enabling metrics does not introduce false sharing between
/// the two sides.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    messages_offered: CachePadded<AtomicU64>,
    offer_failures: CachePadded<AtomicU64>,
    padding_records: CachePadded<AtomicU64>,
    messages_polled: CachePadded<AtomicU64>,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_messages_offered(&self, n: u64) {
        self.messages_offered.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_offer_failure(&self) {
        self.offer_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_padding_record(&self) {
        self.padding_records.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_messages_polled(&self, n: u64) {
        self.messages_polled.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_offered: self.messages_offered.load(Ordering::Relaxed),
            offer_failures: self.offer_failures.load(Ordering::Relaxed),
            padding_records: self.padding_records.load(Ordering::Relaxed),
            messages_polled: self.messages_polled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters of one ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Records successfully offered or published.
    pub messages_offered: u64,
    /// Offers and claims rejected for insufficient space.
    pub offer_failures: u64,
    /// Wrap-around filler records emitted (including abandoned claims).
    pub padding_records: u64,
    /// Records delivered to consumer callbacks.
    pub messages_polled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.add_messages_offered(3);
        metrics.add_offer_failure();
        metrics.add_padding_record();
        metrics.add_messages_polled(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_offered, 3);
        assert_eq!(snapshot.offer_failures, 1);
        assert_eq!(snapshot.padding_records, 1);
        assert_eq!(snapshot.messages_polled, 2);
    }
}

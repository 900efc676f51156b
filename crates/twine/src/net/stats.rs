use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub updates_sent: u64,
    pub updates_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub participants_admitted: u64,
    pub entities_removed: u64,
}

/// Traffic counters shared by every thread of one session.
#[derive(Debug, Default)]
pub struct SyncStats {
    updates_sent: AtomicU64,
    updates_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    participants_admitted: AtomicU64,
    entities_removed: AtomicU64,
}

impl SyncStats {
    pub fn record_sent(&self, bytes: usize) {
        self.updates_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.updates_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.participants_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removed(&self) {
        self.entities_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NetworkStats {
        NetworkStats {
            updates_sent: self.updates_sent.load(Ordering::Relaxed),
            updates_received: self.updates_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            participants_admitted: self.participants_admitted.load(Ordering::Relaxed),
            entities_removed: self.entities_removed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = SyncStats::default();
        stats.record_sent(92);
        stats.record_sent(92);
        stats.record_received(92);
        stats.record_admitted();
        stats.record_removed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.updates_sent, 2);
        assert_eq!(snapshot.bytes_sent, 184);
        assert_eq!(snapshot.updates_received, 1);
        assert_eq!(snapshot.bytes_received, 92);
        assert_eq!(snapshot.participants_admitted, 1);
        assert_eq!(snapshot.entities_removed, 1);
    }
}

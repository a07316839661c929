//! Processing counters.
//!
//! Shared across the ingestion loop, session store, and dispatchers.
//! Queue-full drops must stay observable here even though the drop itself
//! is silent on the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counters {
    packets_received: AtomicU64,
    silence_markers: AtomicU64,
    empty_packets: AtomicU64,
    segments_dispatched: AtomicU64,
    batches_dropped: AtomicU64,
    recognitions_failed: AtomicU64,
    payload_bytes_archived: AtomicU64,
}

impl Counters {
    pub fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_silence_marker(&self) {
        self.silence_markers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_packet(&self) {
        self.empty_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_dispatched(&self) {
        self.segments_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recognition_failed(&self) {
        self.recognitions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archived_bytes(&self, bytes: u64) {
        self.payload_bytes_archived.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            silence_markers: self.silence_markers.load(Ordering::Relaxed),
            empty_packets: self.empty_packets.load(Ordering::Relaxed),
            segments_dispatched: self.segments_dispatched.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            recognitions_failed: self.recognitions_failed.load(Ordering::Relaxed),
            payload_bytes_archived: self.payload_bytes_archived.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub packets_received: u64,
    pub silence_markers: u64,
    pub empty_packets: u64,
    pub segments_dispatched: u64,
    pub batches_dropped: u64,
    pub recognitions_failed: u64,
    pub payload_bytes_archived: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let counters = Counters::default();
        assert_eq!(counters.snapshot(), CountersSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let counters = Counters::default();
        counters.record_packet();
        counters.record_packet();
        counters.record_silence_marker();
        counters.record_batch_dropped();
        counters.record_archived_bytes(128);

        let snap = counters.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.silence_markers, 1);
        assert_eq!(snap.batches_dropped, 1);
        assert_eq!(snap.payload_bytes_archived, 128);
        assert_eq!(snap.segments_dispatched, 0);
    }
}

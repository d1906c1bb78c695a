//! Metrics collection and reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use camera_ipc::PipelineMetrics;

/// Collects pipeline counters. Shared between the producer side, the encode
/// worker and observers; every update is a single atomic add.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_submitted: AtomicU64,
    frames_encoded: AtomicU64,
    payloads_sent: AtomicU64,
    overflow_drops: AtomicU64,
    shutdown_drops: AtomicU64,
    encode_errors: AtomicU64,
    send_errors: AtomicU64,
    bytes_sent: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(None),
            frames_submitted: AtomicU64::new(0),
            frames_encoded: AtomicU64::new(0),
            payloads_sent: AtomicU64::new(0),
            overflow_drops: AtomicU64::new(0),
            shutdown_drops: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    /// Start the uptime clock.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
    }

    /// Stop the uptime clock.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    pub fn record_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload accepted by the transport.
    pub fn record_sent(&self, bytes: u64) {
        self.payloads_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_overflow_drop(&self) {
        self.overflow_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shutdown_drop(&self) {
        self.shutdown_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self, queue_depth: usize) -> PipelineMetrics {
        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| s.elapsed().as_secs())
            .unwrap_or(0);

        let overflow_drops = self.overflow_drops.load(Ordering::Relaxed);
        let shutdown_drops = self.shutdown_drops.load(Ordering::Relaxed);

        PipelineMetrics {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            payloads_sent: self.payloads_sent.load(Ordering::Relaxed),
            dropped_frames: overflow_drops + shutdown_drops,
            overflow_drops,
            shutdown_drops,
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            queue_depth,
            uptime_seconds,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_frames_sums_both_causes() {
        let metrics = MetricsCollector::new();
        metrics.record_overflow_drop();
        metrics.record_overflow_drop();
        metrics.record_shutdown_drop();
        metrics.record_sent(100);

        let snapshot = metrics.snapshot(3);
        assert_eq!(snapshot.dropped_frames, 3);
        assert_eq!(snapshot.overflow_drops, 2);
        assert_eq!(snapshot.payloads_sent, 1);
        assert_eq!(snapshot.bytes_sent, 100);
        assert_eq!(snapshot.queue_depth, 3);
    }

    #[test]
    fn test_uptime_zero_when_stopped() {
        let metrics = MetricsCollector::new();
        metrics.start();
        metrics.stop();
        assert_eq!(metrics.snapshot(0).uptime_seconds, 0);
    }
}

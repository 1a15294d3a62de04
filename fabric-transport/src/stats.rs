//! Connection-level statistics: cheap to clone, safe to share across the
//! poll thread and whatever thread the application reads them from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    payloads_sent: AtomicU64,
    payloads_received: AtomicU64,
    payloads_dropped: AtomicU64,
    window_overflows: AtomicU64,
    probe_resets: AtomicU64,
}

/// A handle to a connection's running counters. Clones share the same
/// underlying atomics.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    counters: Arc<Counters>,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
        }
    }
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_sent(&self) {
        self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet_received(&self) {
        self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payload_sent(&self) {
        self.counters.payloads_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payload_received(&self) {
        self.counters.payloads_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payload_dropped(&self) {
        self.counters.payloads_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_window_overflow(&self) {
        self.counters.window_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_probe_reset(&self) {
        self.counters.probe_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_sent: self.counters.packets_sent.load(Ordering::Relaxed),
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            payloads_sent: self.counters.payloads_sent.load(Ordering::Relaxed),
            payloads_received: self.counters.payloads_received.load(Ordering::Relaxed),
            payloads_dropped: self.counters.payloads_dropped.load(Ordering::Relaxed),
            window_overflows: self.counters.window_overflows.load(Ordering::Relaxed),
            probe_resets: self.counters.probe_resets.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ConnectionStats`], safe to log or export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub payloads_sent: u64,
    pub payloads_received: u64,
    pub payloads_dropped: u64,
    pub window_overflows: u64,
    pub probe_resets: u64,
}
